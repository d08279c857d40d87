mod state;
mod ui;

use adw::prelude::*;
use adw::Application;
use gtk4::glib;
use pyedit::constants::APP_ID;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> glib::ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let app = Application::builder().application_id(APP_ID).build();
    app.connect_activate(ui::build_ui);
    app.run()
}
