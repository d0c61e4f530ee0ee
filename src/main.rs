use clap::Parser;
use dialoguer::Select;
use midibridge::{
    bridge::Bridge,
    cli::{parse_hex_message, validate_destination, Args},
    config::BridgeConfig,
    logging,
    midi::{create_default_engine, encode, DefaultMidiEngine, EndpointInfo},
    monitor::Monitor,
};
use std::io::IsTerminal;
use std::process;
use std::sync::Arc;

fn main() {
    let args = Args::parse();
    let config = load_configuration(&args);
    initialize_logging(&args, &config);

    let strategy = args.strategy.unwrap_or(config.strategy);
    let bridge = Arc::new(Bridge::with_strategy(
        create_default_engine(&config),
        strategy,
    ));

    if args.list || (args.send.is_none() && !args.monitor) {
        list_endpoints(&bridge);
    }

    if let Some(hex) = &args.send {
        send_from_command_line(&bridge, hex, args.destination.as_deref());
    }

    if args.monitor {
        run_monitor(bridge);
    }
}

fn exit_with_error(error_msg: &str) -> ! {
    log::error!("{}", error_msg);
    eprintln!("{}", error_msg);
    process::exit(1);
}

fn load_configuration(args: &Args) -> BridgeConfig {
    BridgeConfig::load(args.config.as_deref())
        .unwrap_or_else(|e| exit_with_error(&format!("Error loading configuration: {}", e)))
}

fn initialize_logging(args: &Args, config: &BridgeConfig) {
    let result = if args.log_stderr {
        logging::init_stderr_logger(config.log_level)
    } else {
        logging::init_logger(config)
    };
    if let Err(e) = result {
        eprintln!("Logger initialization failed: {}", e);
    }
    log::info!("Application starting");
}

fn print_endpoints(title: &str, endpoints: &[EndpointInfo]) {
    println!("{}:", title);
    if endpoints.is_empty() {
        println!("  (none)");
    }
    for endpoint in endpoints {
        println!("  {:>2}  {:08X}  {}", endpoint.index, endpoint.id, endpoint.name);
    }
}

fn list_endpoints(bridge: &Bridge<DefaultMidiEngine>) {
    print_endpoints("MIDI sources", &bridge.sources());
    print_endpoints("MIDI destinations", &bridge.destinations());
}

fn choose_destination(
    destinations: &[EndpointInfo],
    requested: Option<&str>,
) -> Result<EndpointInfo, String> {
    let names: Vec<String> = destinations.iter().map(|d| d.name.clone()).collect();

    if let Some(name) = requested {
        validate_destination(name, &names)?;
        return destinations
            .iter()
            .find(|d| d.name.contains(name))
            .cloned()
            .ok_or_else(|| format!("Error: Destination '{}' disappeared", name));
    }

    match destinations {
        [] => Err("Error: No MIDI destinations available".to_string()),
        [only] => Ok(only.clone()),
        _ if std::io::stdin().is_terminal() => {
            let selection = Select::new()
                .with_prompt("Send to")
                .items(&names)
                .default(0)
                .interact()
                .map_err(|e| format!("Error: Destination prompt failed: {}", e))?;
            Ok(destinations[selection].clone())
        }
        _ => Err("Error: Several destinations available, pick one with --destination".to_string()),
    }
}

fn send_from_command_line(bridge: &Bridge<DefaultMidiEngine>, hex: &str, requested: Option<&str>) {
    let (status, data1, data2) = parse_hex_message(hex)
        .unwrap_or_else(|e| exit_with_error(&format!("Error: Invalid message '{}': {}", hex, e)));

    let destination = choose_destination(&bridge.destinations(), requested)
        .unwrap_or_else(|e| exit_with_error(&e));

    let wire = encode(destination.id, status, data1, data2);
    if bridge.send_message(wire) {
        println!("Sent {:02X} {:02X} {:02X} to {}", status, data1, data2, destination.name);
    } else {
        exit_with_error(&format!("Error: Could not send to {}", destination.name));
    }
}

fn run_monitor(bridge: Arc<Bridge<DefaultMidiEngine>>) {
    log::info!("Monitor running. Press Ctrl+C to exit...");
    println!("\nPress Ctrl+C to exit...");
    Monitor::new(bridge).run();
}
