//! Squad Initiative - Entry Point
//!
//! Runs a scripted encounter against the in-memory host and prints the
//! group headers and turn order after each step.

use async_trait::async_trait;
use clap::{Parser, Subcommand};
use squad_initiative::core::error::{GroupError, Result};
use squad_initiative::core::types::{Appearance, Member, MemberId};
use squad_initiative::core::Settings;
use squad_initiative::group::GroupManager;
use squad_initiative::host::{
    Host, MemoryEncounter, Notifier, RollMode, SeededDice, StaticPrivilege, Summary,
};
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

/// Group initiative for turn-based encounters
#[derive(Parser, Debug)]
#[command(name = "squad-initiative")]
struct Args {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run a scripted encounter and print the tracker after each step
    Demo {
        /// Dice seed
        #[arg(long, default_value_t = 7)]
        seed: u64,

        /// Settings file (TOML)
        #[arg(long)]
        config: Option<PathBuf>,
    },
}

/// Prints notifications to stdout
struct ConsoleNotifier;

#[async_trait]
impl Notifier for ConsoleNotifier {
    async fn info(&self, message: &str) {
        println!("  [info] {}", message);
    }

    async fn warn(&self, message: &str) {
        println!("  [warn] {}", message);
    }

    async fn broadcast(&self, summary: Summary) -> Result<()> {
        println!("  [gm] {}", summary.title);
        for line in &summary.lines {
            println!("         {}", line);
        }
        Ok(())
    }
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    let args = Args::parse();
    let Command::Demo { seed, config } = args.command;

    let settings = match config {
        Some(path) => Settings::load(&path)?,
        None => Settings::default(),
    };
    settings.validate().map_err(GroupError::InvalidInput)?;

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(settings.log_directive())),
        )
        .init();

    tracing::info!(seed, "squad initiative demo starting");
    run_demo(seed, settings).await
}

async fn run_demo(seed: u64, settings: Settings) -> Result<()> {
    let encounter = Arc::new(MemoryEncounter::with_members(vec![
        Member::new("gob-1", "Goblin Boss").with_modifier(2.0).with_tiebreak(14.0),
        Member::new("gob-2", "Goblin").with_modifier(2.0).with_tiebreak(14.0),
        Member::new("gob-3", "Goblin").with_modifier(2.0).with_tiebreak(12.0),
        Member::new("wolf-1", "Wolf").with_modifier(2.0).with_tiebreak(15.0),
        Member::new("wolf-2", "Wolf").with_modifier(2.0).with_tiebreak(15.0),
        Member::new("hero", "Hero").with_modifier(3.0).with_tiebreak(16.0),
    ]));
    let dice = Arc::new(SeededDice::new(seed));
    let host = Host::in_memory(
        encounter.clone(),
        dice.clone(),
        Arc::new(ConsoleNotifier),
        Arc::new(StaticPrivilege::new(true)),
    );
    let manager = Arc::new(GroupManager::new(host, Arc::new(settings)));
    encounter.subscribe(&manager);
    manager.wrap_roll_completion(encounter.as_ref());

    println!("== Create groups");
    let goblins = manager
        .create_group(
            "Goblins",
            Appearance::default(),
            &[MemberId::new("gob-1"), MemberId::new("gob-2"), MemberId::new("gob-3")],
        )
        .await?;
    let wolves = manager
        .create_group(
            "Wolves",
            Appearance {
                img: None,
                color: Some("#8b4513".into()),
            },
            &[MemberId::new("wolf-1"), MemberId::new("wolf-2")],
        )
        .await?;
    print_tracker(&manager, &encounter).await?;

    println!("== Roll goblins with advantage");
    manager.roll_group(&goblins, RollMode::Advantage).await?;
    print_tracker(&manager, &encounter).await?;

    println!("== Roll everyone else");
    encounter.roll_all(dice.as_ref()).await?;
    print_tracker(&manager, &encounter).await?;

    println!("== Move a goblin to the wolves");
    manager.assign_member(&MemberId::new("gob-3"), &wolves).await?;
    print_tracker(&manager, &encounter).await?;

    println!("== Set goblin initiative to 20");
    manager.set_group_initiative_manually(&goblins, 20.0).await?;
    print_tracker(&manager, &encounter).await?;

    for _ in 0..2 {
        let active = encounter.advance_turn().await?;
        println!(
            "== Turn passes to {}",
            active.map(|id| id.to_string()).unwrap_or_default()
        );
        print_tracker(&manager, &encounter).await?;
    }
    Ok(())
}

async fn print_tracker(manager: &GroupManager, encounter: &MemoryEncounter) -> Result<()> {
    for header in manager.headers().await? {
        println!("  {}", header);
    }
    for member in encounter.turn_order()? {
        let initiative = member
            .initiative
            .map(|v| format!("{:.2}", v))
            .unwrap_or_else(|| "-".into());
        let group = member
            .group
            .as_ref()
            .filter(|g| !g.is_ungrouped())
            .map(|g| g.to_string())
            .unwrap_or_default();
        println!("    {:>6}  {:<12} {}", initiative, member.name, group);
    }
    println!();
    Ok(())
}
