use btle_sensor_scanner::app::{self, BluetoothSource, Options};
use btle_sensor_scanner::logging;
use btle_sensor_scanner::upload::http::{HttpTransport, REQUEST_TIMEOUT};
use clap::Parser;
use std::panic::{self, PanicHookInfo};

/// Exit codes for the application
const EXIT_SUCCESS: i32 = 0;
const EXIT_ERROR: i32 = 1;
const EXIT_PANIC: i32 = 2;
const EXIT_USAGE: i32 = -1;

/// Printed to stdout when printing or uploading is requested without a configuration file.
fn usage_message() -> String {
    format!(
        "Specifying a configuration file is required.\n\nFor more details see:\n\n  {} --help\n",
        env!("CARGO_PKG_NAME")
    )
}

#[tokio::main(flavor = "current_thread")]
async fn main() {
    // Set up panic hook to ensure clean exit codes for process managers
    // (e.g., systemd) that monitor exit status
    panic::set_hook(Box::new(move |info: &PanicHookInfo| {
        eprintln!("Panic! {}", info);
        std::process::exit(EXIT_PANIC);
    }));

    let options = Options::parse();

    if let Err(why) = logging::init(options.verbose) {
        eprintln!("warning: {}", why);
    }

    if options.validate().is_err() {
        print!("{}", usage_message());
        std::process::exit(EXIT_USAGE);
    }

    let transport = match HttpTransport::new(REQUEST_TIMEOUT) {
        Ok(transport) => transport,
        Err(why) => {
            eprintln!("error: {}", why);
            std::process::exit(EXIT_ERROR);
        }
    };

    let mut stdout = std::io::stdout();
    match app::run_with_io(options, &BluetoothSource, &transport, &mut stdout).await {
        Ok(()) => std::process::exit(EXIT_SUCCESS),
        Err(why) => {
            tracing::error!(error = %why, "scan session ended");
            eprintln!("error: {}", why);
            std::process::exit(EXIT_ERROR);
        }
    }
}
