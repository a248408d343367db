//! Command-line front end for weekly training progress.

use std::collections::HashMap;
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use clap::Parser;
use services::{AppServices, Clock, HttpGateway, ProgressService, TrackerEvent};
use storage::mirror::FileMirror;
use storage::repository::Storage;
use tokio::sync::broadcast::error::RecvError;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};
use training_core::model::{ExerciseId, PlanId, ProgressKey, UserId, WeeklyProgress};

mod config;

use config::{AppConfig, Cli, Command, NoteAction};

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();
    let app = build_services(&cli.config).await?;
    run(&app, cli.command).await
}

async fn build_services(config: &AppConfig) -> Result<AppServices> {
    let db_url = config.database_url();
    config::prepare_sqlite_file(&db_url)?;
    let mirror = Arc::new(
        FileMirror::open(&config.mirror_dir)
            .with_context(|| format!("opening mirror at {}", config.mirror_dir.display()))?,
    );
    let clock = Clock::default();

    let app = match &config.gateway_url {
        None => AppServices::new_sqlite(&db_url, clock, mirror, config.user()).await?,
        Some(url) => {
            let storage = Storage::sqlite(&db_url).await?;
            let progress = Arc::new(ProgressService::new(clock.clone(), storage.progress));
            let gateway = Arc::new(HttpGateway::new(url)?);
            AppServices::with_remote_gateway(clock, progress, mirror, gateway, config.user())?
        }
    };
    tracing::debug!(db = %db_url, user = %config.user(), "services ready");
    Ok(app)
}

async fn run(app: &AppServices, command: Command) -> Result<()> {
    let progress = app.progress();
    let user = app.user_id();

    match command {
        Command::Init {
            plan,
            weeks,
            exercises,
            start,
        } => {
            let exercises: Vec<_> = exercises.into_iter().map(ExerciseId::new).collect();
            let start = start.unwrap_or_else(chrono::Utc::now);
            let created = progress
                .initialize_for_plan(PlanId::new(plan), user, weeks, start, &exercises)
                .await?;
            println!("Initialized {created} weekly records for plan {plan}");
        }

        Command::Show { target } => {
            let record = progress
                .get_or_create_progress(target.plan_id(), target.exercise_id(), user, target.week)
                .await?;
            print_record(&record);
            for note in record.weekly_notes() {
                println!("  {} | {} | {}", note.note_id, note.date.format("%Y-%m-%d"), note.note);
            }
        }

        Command::List { plan } => {
            let records = progress.list_plan_progress(PlanId::new(plan), user).await?;
            if records.is_empty() {
                println!("No progress recorded for plan {plan}");
            }
            for record in &records {
                print_record(record);
            }
        }

        Command::Sets {
            target,
            add,
            total,
            all,
        } => {
            let tracker = app.tracker();
            app.hydrate_week(target.plan_id(), target.week).await?;

            let mut events = tracker.subscribe();
            let optimistic = tracker.update_set_completion(
                target.plan_id(),
                target.week,
                target.exercise_id(),
                add,
                total,
                all,
            )?;
            println!(
                "Week {}: {}/{} sets{}",
                target.week,
                optimistic.sets_completed(),
                total,
                if optimistic.is_exercise_done() { " (done)" } else { "" }
            );
            await_confirmation(&mut events, optimistic.key()).await?;
        }

        Command::Note { action } => run_note(&progress, user, action).await?,

        Command::History { plan, totals } => {
            let totals: HashMap<_, _> = totals.into_iter().collect();
            let weeks = progress
                .weekly_history(PlanId::new(plan), user, &totals)
                .await?;
            println!("Week | Sets      | Done  | %");
            println!("{:-<34}", "");
            for week in weeks {
                println!(
                    "{:>4} | {:>4}/{:<4} | {:>2}/{:<2} | {:>3}",
                    week.week_number,
                    week.sets_completed,
                    week.sets_planned,
                    week.exercises_done,
                    week.exercises_tracked,
                    week.completion_percent()
                );
            }
        }

        Command::Delete { target } => {
            let key = ProgressKey::new(user, target.plan_id(), target.exercise_id(), target.week)?;
            if progress.delete_progress(key).await? {
                println!("Deleted week {} of exercise {}", target.week, target.exercise);
            } else {
                println!("Nothing to delete");
            }
        }
    }

    Ok(())
}

async fn run_note(
    progress: &ProgressService,
    user: UserId,
    action: NoteAction,
) -> Result<()> {
    match action {
        NoteAction::Add { target, text } => {
            let note = progress
                .add_note(target.plan_id(), target.exercise_id(), user, target.week, &text)
                .await?;
            println!("Added note {}", note.note_id);
        }
        NoteAction::Edit { target, id, text } => {
            let note = progress
                .edit_note(target.plan_id(), target.exercise_id(), user, target.week, id, &text)
                .await?;
            println!("Updated note {}: {}", note.note_id, note.note);
        }
        NoteAction::Delete { target, id } => {
            let removed = progress
                .delete_note(target.plan_id(), target.exercise_id(), user, target.week, id)
                .await?;
            if removed {
                println!("Deleted note {id}");
            } else {
                println!("Note {id} not found");
            }
        }
    }
    Ok(())
}

async fn await_confirmation(
    events: &mut tokio::sync::broadcast::Receiver<TrackerEvent>,
    key: ProgressKey,
) -> Result<()> {
    loop {
        match events.recv().await {
            Ok(TrackerEvent::Confirmed { key: k, .. }) if k == key => {
                println!("Saved");
                return Ok(());
            }
            Ok(TrackerEvent::RolledBack { key: k }) if k == key => {
                // The notice with the reason follows the rollback.
                if let Ok(TrackerEvent::Notice(notice)) = events.recv().await {
                    bail!(notice.message);
                }
                bail!("Failed to update progress");
            }
            Ok(_) | Err(RecvError::Lagged(_)) => {}
            Err(RecvError::Closed) => bail!("tracker stopped before confirming"),
        }
    }
}

fn print_record(record: &WeeklyProgress) {
    let key = record.key();
    println!(
        "plan {} | week {:>2} | exercise {:>4} | {:>2} sets{} | {} - {} | {} notes",
        key.plan_id,
        key.week_number,
        key.exercise_id,
        record.sets_completed(),
        if record.is_exercise_done() { " done" } else { "" },
        record.window().start.format("%Y-%m-%d"),
        record.window().end.format("%Y-%m-%d"),
        record.weekly_notes().len()
    );
}
