pub mod actions;
pub mod config;
pub mod report;

use clap::{Arg, ArgMatches, Command};

/// Build the command line definition.
pub fn command() -> Command {
    Command::new("roamctl")
        .about("Drive attenuators to force WiFi stations to roam and count the roams")
        .arg(
            Arg::new("config")
                .long("config")
                .short('c')
                .help("Configuration file (TOML, or JSON with a .json extension)")
                .value_name("FILE"),
        )
        .arg(
            Arg::new("controller")
                .long("controller")
                .help("Base URL of the LANforge JSON API")
                .value_name("URL"),
        )
        .arg(
            Arg::new("stations")
                .long("stations")
                .help("Stations under test as shelf.resource.port, comma separated")
                .value_name("LIST")
                .value_delimiter(',')
                .num_args(1..),
        )
        .arg(
            Arg::new("attenuators")
                .long("attenuators")
                .help("Attenuator serials in pairing order, comma separated")
                .value_name("LIST")
                .value_delimiter(',')
                .num_args(1..),
        )
        .arg(
            Arg::new("bssids")
                .long("bssids")
                .help("BSSIDs of the APs under test, comma separated")
                .value_name("LIST")
                .value_delimiter(',')
                .num_args(1..),
        )
        .arg(
            Arg::new("step")
                .long("step")
                .help("Attenuation step size")
                .value_name("STEP")
                .value_parser(clap::value_parser!(u32)),
        )
        .arg(
            Arg::new("max-attenuation")
                .long("max-attenuation")
                .help("Maximum attenuation value")
                .value_name("VALUE")
                .value_parser(clap::value_parser!(u32)),
        )
        .arg(
            Arg::new("iterations")
                .long("iterations")
                .short('i')
                .help("Iterations per attenuator pair")
                .value_name("N")
                .value_parser(clap::value_parser!(usize)),
        )
        .arg(
            Arg::new("wait-time")
                .long("wait-time")
                .help("Seconds to wait after each attenuation step")
                .value_name("SECS")
                .value_parser(clap::value_parser!(u64)),
        )
        .arg(
            Arg::new("max-missed-polls")
                .long("max-missed-polls")
                .help("Consecutive failed polls before a station is dropped")
                .value_name("N")
                .value_parser(clap::value_parser!(u32)),
        )
        .arg(
            Arg::new("result-dir")
                .long("result-dir")
                .help("Directory receiving the run results")
                .value_name("DIR"),
        )
        .arg(
            Arg::new("ssh-host")
                .long("ssh-host")
                .help("Sniffer host (defaults to the controller host)")
                .value_name("HOST"),
        )
        .arg(
            Arg::new("ssh-user")
                .long("ssh-user")
                .help("SSH user on the sniffer host")
                .value_name("USER"),
        )
        .arg(
            Arg::new("ssh-port")
                .long("ssh-port")
                .help("SSH port on the sniffer host")
                .value_name("PORT")
                .value_parser(clap::value_parser!(u16)),
        )
        .arg(
            Arg::new("capture-interface")
                .long("capture-interface")
                .help("Monitor interface the sniffer captures on")
                .value_name("IFACE"),
        )
        .arg(
            Arg::new("sniff-radio")
                .long("sniff-radio")
                .help("Radio the monitor interface is created on, as shelf.resource.radio")
                .value_name("RADIO"),
        )
        .arg(
            Arg::new("channel")
                .long("channel")
                .help("Sniffing channel, or AUTO to keep the radio's channel")
                .value_name("CHANNEL"),
        )
        .arg(
            Arg::new("frequency")
                .long("frequency")
                .help("Sniffing frequency in MHz")
                .value_name("MHZ")
                .value_parser(clap::value_parser!(u32)),
        )
        .arg(
            Arg::new("keep-monitor")
                .long("keep-monitor")
                .help("Capture on the existing interface instead of recreating the monitor")
                .action(clap::ArgAction::SetTrue),
        )
        .arg(
            Arg::new("log-file")
                .long("log-file")
                .help("Also write the log to this file")
                .value_name("FILE"),
        )
        .arg(
            Arg::new("dry-run")
                .long("dry-run")
                .help("Run the schedule against a simulated bench without touching any device")
                .action(clap::ArgAction::SetTrue),
        )
        .arg(
            Arg::new("from-results")
                .long("from-results")
                .help("Recompute totals from a saved roam_results.json or partial_run.json")
                .value_name("FILE")
                .conflicts_with("dry-run"),
        )
}

/// Parse command line arguments and return ArgMatches.
pub fn parse_args() -> ArgMatches {
    command().get_matches()
}
