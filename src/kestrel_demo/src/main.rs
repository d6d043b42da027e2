use kestrel_demo::{AppConfig, Board};

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let config = AppConfig::default();
    match kestrel_demo::run(&config, Board::host()) {
        Ok(report) => {
            for task in &report.tasks {
                log::info!("task `{}`: {:?}", task.name, task.state);
            }
        }
        Err(e) => {
            log::error!("{e}");
            std::process::exit(1);
        }
    }
}
