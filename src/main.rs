use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use tracing_subscriber::EnvFilter;

use chat_timeline::{
    settings::load_settings,
    timeline::RowContent,
    ConversationTimeline, Descriptor, Millis, StoreRequest, TimelineUpdate,
};

/// Composes a conversation timeline from a JSON dump of descriptors and prints its rows.
#[derive(Parser, Debug)]
struct Cli {
    /// A JSON file containing an array of descriptors.
    #[clap(value_parser)]
    descriptors: PathBuf,

    /// The timeline settings file. Defaults are used if it doesn't exist.
    #[clap(short, long)]
    settings: Option<PathBuf>,

    /// The current time, in milliseconds since the Unix epoch.
    #[clap(short, long, default_value_t = 0)]
    now: Millis,

    /// Peers that are currently typing.
    #[clap(short, long)]
    typing: Vec<String>,

    /// Treat the conversation as a group chat.
    #[clap(short, long, action)]
    group: bool,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    let mut settings = match &cli.settings {
        Some(path) => load_settings(path)?,
        None => Default::default(),
    };
    settings.group_chat |= cli.group;

    let json = std::fs::read_to_string(&cli.descriptors)
        .with_context(|| format!("failed to read {}", cli.descriptors.display()))?;
    let descriptors: Vec<Descriptor> = serde_json::from_str(&json)
        .with_context(|| format!("failed to parse descriptors in {}", cli.descriptors.display()))?;

    let (update_sender, update_receiver) = crossbeam_channel::unbounded();
    let (request_sender, request_receiver) = crossbeam_channel::unbounded();
    let mut timeline = ConversationTimeline::new(settings, update_receiver, request_sender);

    update_sender.send(TimelineUpdate::FirstUpdate { descriptors })?;
    if !cli.typing.is_empty() {
        update_sender.send(TimelineUpdate::TypingUsers { users: cli.typing })?;
    }
    timeline.process_timeline_updates(cli.now);
    timeline.tick(cli.now);

    for position in 0..timeline.row_count() {
        let Some(row) = timeline.bind(position, cli.now) else { continue };
        let text = match row.content {
            RowContent::Header => "── header ──".to_owned(),
            RowContent::Footer => "── footer ──".to_owned(),
            RowContent::Typing { text } => format!("… {text}"),
            RowContent::Time { day } => format!("[{day}]"),
            RowContent::Name { peer } => format!("<{peer}>"),
            RowContent::Item(item) => format!(
                "{:?} {:?} {:?} corners={:?} badges={} progress={:?}",
                item.side,
                row.kind,
                item.state,
                item.corners,
                item.badges.len(),
                item.ephemeral_progress,
            ),
        };
        println!("{position:>4} {:>6} {text}", row.id.to_string());
    }

    for request in request_receiver.try_iter() {
        match request {
            StoreRequest::MarkRead(id) => println!("request: mark {id} read"),
            StoreRequest::Delete { id, reason } => println!("request: delete {id} ({reason:?})"),
        }
    }
    Ok(())
}
