use person_stream::vision::{self, VisionConfig};

fn main() {
    if let Err(err) = run() {
        eprintln!("{err:?}");
        std::process::exit(1);
    }
}

fn run() -> anyhow::Result<()> {
    let config = VisionConfig::from_env()?;
    vision::run(config)
}
