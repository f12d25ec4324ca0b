mod app;

use clap::Parser;

use app::{Args, WallblurApp};

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("wallblur=info".parse().unwrap()),
        )
        .init();

    let app = WallblurApp::new(Args::parse());
    let code = match app.run() {
        Ok(code) => code,
        Err(e) => {
            tracing::error!(error = ?e, "wallblur failed");
            2
        }
    };
    std::process::exit(code);
}
