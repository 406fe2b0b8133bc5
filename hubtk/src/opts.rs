use clap::Parser;

/// Connection toolkit for the Nintendo Switch controllers
///
/// Env variables:
///
/// - `RUST_LOG=<level>`:
///
///   -   `trace`: log every HID report
///
///   -   `debug`: log protocol and lifecycle steps
///
/// - `LOG_PRETTY=1`: use a more verbose logging format
#[derive(Parser)]
pub struct Opts {
    #[clap(subcommand)]
    pub subcmd: SubCommand,
}

#[derive(Parser)]
pub enum SubCommand {
    /// List the connected supported controllers
    Devices(Devices),
    /// Show live decoded inputs from every connected controller
    Monitor(Monitor),
}

#[derive(Parser)]
pub struct Devices {
    /// Keep scanning until at least one controller is found
    #[clap(short, long)]
    pub wait: bool,
}

#[derive(Parser)]
pub struct Monitor {
    /// Use the tighter timing profile (shorter timeouts, priming command)
    #[clap(long)]
    pub tight: bool,
    /// Radial stick deadzone, between 0 and 1
    #[clap(long, default_value = "0.1")]
    pub deadzone: f64,
}
