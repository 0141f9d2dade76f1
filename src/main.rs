//! x11serve - Main entry point
//!
//! A headless X11 server reachable over TCP

use std::env;
use std::net::IpAddr;
use std::process;
use std::sync::Arc;

use x11serve::server::{parse_screen_size, start_tcp_listener, X_TCP_PORT};
use x11serve::{Server, ServerConfig, VERSION};

fn print_usage() {
    println!("x11serve v{}", VERSION);
    println!("A headless X11 server implementation");
    println!();
    println!("Usage: x11serve [OPTIONS]");
    println!();
    println!("Options:");
    println!("  -port <n>             TCP port to listen on (default: 6000)");
    println!("  -display <n>          Display number, listens on port 6000 + n");
    println!("  -listen <addr>        Address to bind (default: 0.0.0.0)");
    println!("  -auth                 Refuse clients that send authorization data");
    println!("  -strict               Drop clients that send unknown requests");
    println!("  -screen <W>x<H>       Root window size (default: 1024x768)");
    println!("  -host <addr>          Allow connections from <addr> only (repeatable)");
    println!("  -h, --help            Show this help message");
    println!();
    println!("Examples:");
    println!("  x11serve -display 1");
    println!("  x11serve -listen 127.0.0.1 -screen 1280x1024 -strict");
    println!();
}

fn next_value<'a>(args: &'a [String], i: &mut usize, flag: &str) -> Result<&'a str, String> {
    *i += 1;
    args.get(*i)
        .map(String::as_str)
        .ok_or_else(|| format!("Missing value for {}", flag))
}

fn parse_args() -> Result<ServerConfig, String> {
    let mut config = ServerConfig::default();
    let args: Vec<String> = env::args().collect();
    let mut i = 1;

    while i < args.len() {
        match args[i].as_str() {
            "-h" | "--help" => {
                print_usage();
                process::exit(0);
            }
            "-port" => {
                config.port = next_value(&args, &mut i, "-port")?
                    .parse()
                    .map_err(|_| "Invalid port number".to_string())?;
            }
            "-display" => {
                let display: u16 = next_value(&args, &mut i, "-display")?
                    .parse()
                    .map_err(|_| "Invalid display number".to_string())?;
                config.port = X_TCP_PORT
                    .checked_add(display)
                    .ok_or_else(|| format!("Display number out of range: {}", display))?;
            }
            "-listen" => {
                let addr = next_value(&args, &mut i, "-listen")?;
                config.bind_address = addr
                    .parse()
                    .map_err(|_| format!("Invalid listen address: {}", addr))?;
            }
            "-auth" => {
                config.enforce_auth = true;
            }
            "-strict" => {
                config.strict = true;
            }
            "-screen" => {
                let size = next_value(&args, &mut i, "-screen")?;
                let (w, h) = parse_screen_size(size)
                    .ok_or_else(|| format!("Invalid screen size: {}", size))?;
                config.screen_width = w;
                config.screen_height = h;
            }
            "-host" => {
                let host = next_value(&args, &mut i, "-host")?;
                let ip: IpAddr = host
                    .parse()
                    .map_err(|_| format!("Invalid host address: {}", host))?;
                config.hosts.push(ip);
            }
            arg => {
                return Err(format!("Unknown option: {}", arg));
            }
        }
        i += 1;
    }

    Ok(config)
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let config = match parse_args() {
        Ok(config) => config,
        Err(err) => {
            eprintln!("Error: {}", err);
            eprintln!();
            print_usage();
            process::exit(1);
        }
    };

    log::info!("x11serve v{}", VERSION);
    log::info!(
        "Screen: {}x{}, auth enforced: {}, strict: {}",
        config.screen_width,
        config.screen_height,
        config.enforce_auth,
        config.strict
    );
    if !config.hosts.is_empty() {
        log::info!("Access list: {:?}", config.hosts);
    }

    let server = match Server::new(config) {
        Ok(server) => Arc::new(server),
        Err(e) => {
            log::error!("Cannot create the screen: {}", e);
            process::exit(1);
        }
    };
    if let Err(e) = start_tcp_listener(server) {
        log::error!("Server error: {}", e);
        process::exit(1);
    }
}
