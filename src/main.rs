//! zre-msg - Inspect and build ZRE wire frames
//!
//! Encodes messages into hex frames and decodes hex frames back into
//! readable messages.

use std::path::PathBuf;

use anyhow::Context;
use bytes::Bytes;
use clap::{Parser, Subcommand, ValueEnum};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use zre_msg::config::{self, Config};
use zre_msg::protocol::{HEADER_SIZE, MAX_SHORT_STRING, PROTOCOL_VERSION, SIGNATURE};
use zre_msg::{
    EndpointRole, FrameLayout, Hello, Join, Leave, MemoryTransport, Message, MessageId, Ping,
    PingOk, RecvMode, Shout, Transport, Whisper,
};

/// zre-msg - ZRE wire frame tool
#[derive(Parser)]
#[command(name = "zre-msg")]
#[command(author = "zre-msg Contributors")]
#[command(version = "0.1.0")]
#[command(about = "Build and inspect ZRE protocol frames", long_about = None)]
struct Cli {
    /// Path to configuration file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Encode a message and print its frames as hex, one per line
    Encode {
        /// Message kind
        #[arg(value_enum)]
        kind: Kind,

        /// Sequence number
        #[arg(short, long, default_value_t = 0)]
        sequence: u16,

        /// Group name (SHOUT, JOIN, LEAVE)
        #[arg(short, long, default_value = "")]
        group: String,

        /// Status value (HELLO, JOIN, LEAVE)
        #[arg(long, default_value_t = 0)]
        status: u8,

        /// Content as UTF-8 text (WHISPER, SHOUT)
        #[arg(long, conflicts_with = "content_hex")]
        content: Option<String>,

        /// Content as hex (WHISPER, SHOUT)
        #[arg(long)]
        content_hex: Option<String>,

        /// Connect endpoint (HELLO)
        #[arg(long, default_value = "")]
        endpoint: String,

        /// Public name (HELLO)
        #[arg(long, default_value = "")]
        name: String,

        /// Comma separated group list (HELLO)
        #[arg(long, value_delimiter = ',')]
        groups: Vec<String>,

        /// Header property as key=value (HELLO), repeatable
        #[arg(long = "header", value_parser = parse_header)]
        headers: Vec<(String, String)>,

        /// Routing id as hex, emitted as a leading frame when addressed
        #[arg(long)]
        routing_id: Option<String>,

        /// Content frame layout (defaults to the configured layout)
        #[arg(long, value_enum)]
        layout: Option<Layout>,

        /// Encode for a router-style endpoint
        #[arg(long)]
        addressed: bool,
    },

    /// Decode hex frames into a message
    Decode {
        /// Frames as hex, in order
        #[arg(required = true)]
        frames: Vec<String>,

        /// First frame is a routing id
        #[arg(long)]
        addressed: bool,

        /// Print as JSON
        #[arg(long)]
        json: bool,
    },

    /// Show current configuration
    Config {
        /// Generate sample configuration
        #[arg(long)]
        generate: bool,

        /// Output path for generated config
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Show protocol constants
    Info,
}

#[derive(Clone, Copy, ValueEnum)]
enum Kind {
    Hello,
    Whisper,
    Shout,
    Join,
    Leave,
    Ping,
    PingOk,
}

#[derive(Clone, Copy, ValueEnum)]
enum Layout {
    Inline,
    SeparateContent,
}

impl From<Layout> for FrameLayout {
    fn from(layout: Layout) -> Self {
        match layout {
            Layout::Inline => FrameLayout::Inline,
            Layout::SeparateContent => FrameLayout::SeparateContent,
        }
    }
}

fn parse_header(s: &str) -> Result<(String, String), String> {
    s.split_once('=')
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .ok_or_else(|| format!("expected key=value, got '{}'", s))
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Load configuration
    let config = if let Some(config_path) = &cli.config {
        Config::load(config_path)?
    } else {
        Config::load_default().unwrap_or_default()
    };

    // Initialize logging
    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new(&config.general.log_level)
    };

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(filter)
        .init();

    match cli.command {
        Commands::Encode {
            kind,
            sequence,
            group,
            status,
            content,
            content_hex,
            endpoint,
            name,
            groups,
            headers,
            routing_id,
            layout,
            addressed,
        } => {
            let content = match (content, content_hex) {
                (Some(text), _) => text.into_bytes(),
                (None, Some(encoded)) => hex::decode(encoded).context("invalid --content-hex")?,
                (None, None) => Vec::new(),
            };

            let mut msg: Message = match kind {
                Kind::Hello => {
                    let mut m = Hello::new();
                    m.endpoint = endpoint;
                    m.groups = groups;
                    m.status = status;
                    m.name = name;
                    m.headers = headers.into_iter().collect();
                    m.into()
                }
                Kind::Whisper => {
                    let mut m = Whisper::new();
                    m.content = content;
                    m.into()
                }
                Kind::Shout => {
                    let mut m = Shout::new();
                    m.group = group;
                    m.content = content;
                    m.into()
                }
                Kind::Join => {
                    let mut m = Join::new();
                    m.group = group;
                    m.status = status;
                    m.into()
                }
                Kind::Leave => {
                    let mut m = Leave::new();
                    m.group = group;
                    m.status = status;
                    m.into()
                }
                Kind::Ping => Ping::new().into(),
                Kind::PingOk => PingOk::new().into(),
            };
            msg.set_sequence(sequence);
            if let Some(routing_id) = routing_id {
                msg.set_routing_id(hex::decode(routing_id).context("invalid --routing-id")?);
            }

            let layout = layout.map(FrameLayout::from).unwrap_or(config.codec.content_layout);
            let addressed = addressed || config.codec.addressed;
            run_encode(&msg, layout, addressed)?;
        }
        Commands::Decode {
            frames,
            addressed,
            json,
        } => {
            let frames = frames
                .iter()
                .map(|f| hex::decode(f).map(Bytes::from))
                .collect::<Result<Vec<_>, _>>()
                .context("frames must be hex")?;
            run_decode(frames, addressed || config.codec.addressed, json)?;
        }
        Commands::Config { generate, output } => {
            if generate {
                let sample = config::generate_sample_config()?;
                if let Some(path) = output {
                    std::fs::write(&path, &sample)?;
                    println!("Configuration written to: {}", path.display());
                } else {
                    println!("{}", sample);
                }
            } else {
                println!("{}", toml::to_string_pretty(&config)?);
            }
        }
        Commands::Info => {
            print_protocol_info();
        }
    }

    Ok(())
}

fn role(addressed: bool) -> EndpointRole {
    if addressed {
        EndpointRole::Addressed
    } else {
        EndpointRole::Unaddressed
    }
}

/// Push the message through a loopback endpoint and dump what went on the wire
fn run_encode(msg: &Message, layout: FrameLayout, addressed: bool) -> anyhow::Result<()> {
    let mut transport = MemoryTransport::loopback(role(addressed));
    zre_msg::send_with(msg, &mut transport, layout)?;

    for frame in transport.recv_frames(RecvMode::NonBlocking)? {
        println!("{}", hex::encode(&frame));
    }
    Ok(())
}

/// Feed raw frames through a loopback endpoint and decode them
fn run_decode(frames: Vec<Bytes>, addressed: bool, json: bool) -> anyhow::Result<()> {
    let mut transport = MemoryTransport::loopback(role(addressed));
    let count = frames.len();
    for (i, frame) in frames.into_iter().enumerate() {
        transport.send_frame(frame, i + 1 < count)?;
    }

    let msg = zre_msg::recv_nowait(&mut transport)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&msg)?);
    } else {
        if !msg.routing_id().is_empty() {
            println!("routing_id = {}", hex::encode(msg.routing_id()));
        }
        println!("{}", msg);
    }
    Ok(())
}

fn print_protocol_info() {
    println!("ZRE Protocol Information");
    println!("========================\n");

    println!("Signature: {:#06X}", SIGNATURE);
    println!("Version: {}", PROTOCOL_VERSION);
    println!("Header size: {} bytes", HEADER_SIZE);
    println!("Max short string: {} bytes", MAX_SHORT_STRING);

    println!("\nMessage ids:");
    for id in MessageId::ALL {
        println!("  {:>2}  {}", u8::from(id), id);
    }
}
