use roamctl::{boot, cli, utils::sleep::StopSignal};

#[tokio::main]
async fn main() {
    let matches = cli::parse_args();
    boot::init_logger(matches.get_one::<String>("log-file").map(String::as_str));

    let stop = StopSignal::new();
    let handle = stop.clone();
    if let Err(err) = ctrlc::set_handler(move || {
        log::warn!("Stop requested, the run ends after the current step");
        handle.request_stop();
    }) {
        log::warn!("Failed to install the Ctrl-C handler: {err}");
    }

    if let Err(err) = cli::actions::dispatch(&matches, stop).await {
        log::error!("{err:#}");
        std::process::exit(1);
    }
}
