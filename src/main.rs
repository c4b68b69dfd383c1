mod cli;
mod core;
mod render;
mod video;
mod worker;

fn main() -> anyhow::Result<()> {
    env_logger::init();
    cli::run()
}
