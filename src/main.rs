mod app;

use std::process::ExitCode;

fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    match app::run() {
        Ok(code) => code,
        Err(err) => {
            log::error!("{:#}", err);
            ExitCode::from(2)
        }
    }
}
