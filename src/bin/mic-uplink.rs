//! Microphone uplink demo
//!
//! Connects to the configured media server and reads commands from stdin:
//!
//! ```text
//! start          start streaming (send-only variant)
//! call <peer>    call a peer (call variant)
//! stop           stop streaming
//! quit           shut down
//! ```
//!
//! Configuration comes from `MIC_UPLINK_*` environment variables.
//!
//! Usage: cargo run --bin mic-uplink

use log::{error, info, warn};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;

use mic_uplink::{ClientId, Intent, SessionConfig, SessionController, SessionDeps};

fn parse_command(line: &str) -> Option<Intent> {
    let mut words = line.split_whitespace();
    match (words.next()?, words.next()) {
        ("start", _) => Some(Intent::Start { target: None }),
        ("call", Some(peer)) => Some(Intent::Start {
            target: Some(ClientId::from(peer)),
        }),
        ("stop", _) => Some(Intent::Stop),
        ("quit" | "exit", _) => Some(Intent::Shutdown),
        _ => None,
    }
}

#[tokio::main(flavor = "current_thread")]
async fn main() {
    // Initialize logging
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let config = match SessionConfig::from_env() {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Invalid configuration: {}", e);
            return;
        }
    };
    let deps = match SessionDeps::live(&config) {
        Ok(d) => d,
        Err(e) => {
            eprintln!("Failed to set up WebRTC: {}", e);
            return;
        }
    };

    println!("mic-uplink");
    println!("==========");
    println!("Server: {}", config.signaling_url);
    println!("Commands: start | call <peer> | stop | quit");
    println!();

    let mut controller = SessionController::new(config, deps);
    println!("Client id: {}", controller.client_id());

    let (intent_tx, intent_rx) = mpsc::channel::<Intent>(16);

    // Setup Ctrl+C handler
    let ctrlc_tx = intent_tx.clone();
    if let Err(e) = ctrlc::set_handler(move || {
        println!("\nStopping...");
        let _ = ctrlc_tx.try_send(Intent::Shutdown);
    }) {
        warn!("Error setting Ctrl+C handler: {}", e);
    }

    // Status printer
    let mut snapshots = controller.subscribe();
    tokio::spawn(async move {
        while snapshots.changed().await.is_ok() {
            let s = snapshots.borrow_and_update().clone();
            println!("[{}] {}", s.state, s.status);
            if let Some(last) = s.server_messages.last() {
                info!("Last server message: {}", last);
            }
        }
    });

    // Commands from stdin
    tokio::spawn(async move {
        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        loop {
            match lines.next_line().await {
                Ok(Some(line)) => match parse_command(&line) {
                    Some(intent) => {
                        if intent_tx.send(intent).await.is_err() {
                            break;
                        }
                    }
                    None if line.trim().is_empty() => {}
                    None => println!("Unknown command: {}", line.trim()),
                },
                Ok(None) => {
                    let _ = intent_tx.send(Intent::Shutdown).await;
                    break;
                }
                Err(e) => {
                    error!("Failed to read stdin: {}", e);
                    break;
                }
            }
        }
    });

    controller.init().await;
    controller.run(intent_rx).await;

    println!("Stopped.");
}
