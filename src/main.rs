use std::{
    io::{self, BufRead},
    path::PathBuf,
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
        mpsc::{self, TryRecvError},
    },
    thread,
    time::Instant,
};

use clap::{Parser, Subcommand, arg};
use log::{error, info, warn};
use rover_console::{
    Channel, ChannelClient, ConsoleConfig, ConsoleError, Inbound, Session,
    channel::CONNECTION_EVENT,
    console::{Intent, apply_intent, parse_intent, render_log, render_status},
    event_log::LogEntry,
    replay, writer,
};

const PROMPT_HELP: &str = "type `help` for the list of commands, `quit` to exit";

#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
#[command(propagate_version = true)]
struct Args {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Drive a vehicle from the terminal
    Drive {
        /// Controller address, overrides the config file
        #[arg(short, long)]
        addr: Option<String>,

        /// Append the event log to this JSON Lines file
        #[arg(short, long)]
        log: Option<PathBuf>,

        /// Write the effective settings back to the config file before connecting
        #[arg(long)]
        save_config: bool,
    },
    /// Play a recorded JSON Lines session through the console offline
    Replay {
        #[arg(short, long)]
        input: PathBuf,
    },
}

fn load_config() -> ConsoleConfig {
    match ConsoleConfig::from_local_file() {
        Ok(Some(config)) => config,
        Ok(None) => ConsoleConfig::default(),
        Err(e) => {
            warn!("Could not load config file, using defaults: {}", e);
            ConsoleConfig::default()
        }
    }
}

fn print_new_entries<C: Channel>(session: &Session<C>, last_seq: &mut u64) {
    let since = *last_seq;
    for entry in session.event_log().entries_since(since) {
        println!("  * {}", entry.message);
        *last_seq = entry.seq;
    }
}

fn drive(
    addr: Option<String>,
    log_file: Option<PathBuf>,
    save_config: bool,
) -> Result<(), ConsoleError> {
    let config = load_config().with_controller_addr(addr);
    if save_config {
        config.save()?;
        info!("Saved config to {:?}", ConsoleConfig::default_path());
    }

    let client = ChannelClient::new(config.channel_settings());
    let mut session = Session::new(client, config.session_settings());

    // mirror the event log to a file when requested
    if let Some(output_file) = log_file {
        let (log_tx, log_rx) = mpsc::channel::<LogEntry>();
        session.event_log_mut().attach_writer(log_tx);
        thread::spawn(move || {
            if let Err(e) = writer::write_event_log(&output_file, log_rx) {
                error!("Event log writer stopped: {}", e);
            }
        });
    }

    session.channel_mut().subscribe(
        CONNECTION_EVENT,
        Box::new(|event: &Inbound| {
            if let Inbound::Connection(state) = event {
                println!("[link] {}", state);
            }
        }),
    );
    info!("Connecting to {}", config.controller_addr);
    session.connect()?;

    let running = Arc::new(AtomicBool::new(true));
    let handler_running = running.clone();
    ctrlc::set_handler(move || {
        println!("Exiting...");
        handler_running.store(false, Ordering::SeqCst);
    })
    .map_err(|e| ConsoleError::SignalHandlerError { source: e })?;

    let (line_tx, line_rx) = mpsc::channel::<String>();
    thread::spawn(move || {
        for line in io::stdin().lock().lines() {
            match line {
                Ok(line) => {
                    if line_tx.send(line).is_err() {
                        break;
                    }
                }
                Err(e) => {
                    error!("{}", ConsoleError::OperatorInputError { source: e });
                    break;
                }
            }
        }
    });

    println!("{}", PROMPT_HELP);
    let refresh = config.refresh_interval();
    let mut last_seq = 0;
    while running.load(Ordering::SeqCst) {
        session.poll(Instant::now());
        print_new_entries(&session, &mut last_seq);

        match line_rx.try_recv() {
            Ok(line) if line.trim().is_empty() => {}
            Ok(line) => match parse_intent(&line) {
                Ok(Intent::Quit) => break,
                Ok(intent) => {
                    let reply = apply_intent(&mut session, intent);
                    println!("{}", reply);
                    print_new_entries(&session, &mut last_seq);
                }
                Err(e) => println!("{}", e),
            },
            Err(TryRecvError::Empty) => thread::sleep(refresh),
            // stdin closed
            Err(TryRecvError::Disconnected) => break,
        }
    }

    info!("Closing session");
    session.close();
    Ok(())
}

fn run_replay(input: &PathBuf) -> Result<(), ConsoleError> {
    let steps = replay::load_replay(input)?;
    let config = load_config();
    let outcome = replay::replay(steps, config.session_settings());

    for reply in &outcome.replies {
        println!("> {}", reply);
    }
    println!("\n-- published --");
    for command in outcome.session.channel().published() {
        println!("{}", command);
    }
    println!("\n-- status --\n{}", render_status(&outcome.session));
    println!("\n-- event log --\n{}", render_log(outcome.session.event_log()));
    if outcome.skipped > 0 {
        println!("\n{} steps skipped", outcome.skipped);
    }
    Ok(())
}

fn main() {
    #[cfg(debug_assertions)]
    colog::init();

    let cli = Args::parse();
    let result = match &cli.command {
        Commands::Drive {
            addr,
            log,
            save_config,
        } => drive(addr.clone(), log.clone(), *save_config),
        Commands::Replay { input } => run_replay(input),
    };
    if let Err(e) = result {
        error!("{}", e);
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}
