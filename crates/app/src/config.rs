use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use chrono::{DateTime, NaiveDate, Utc};
use clap::{Args, Parser, Subcommand};
use training_core::model::{ExerciseId, NoteId, PlanId, UserId};

#[derive(Parser)]
#[command(name = "training")]
#[command(author, version, about = "Weekly training-plan progress tracker")]
pub struct Cli {
    #[command(flatten)]
    pub config: AppConfig,

    #[command(subcommand)]
    pub command: Command,
}

/// Connection and identity settings shared by every command.
#[derive(Args, Debug, Clone)]
pub struct AppConfig {
    /// SQLite database (path or sqlite:// URL)
    #[arg(long = "db", global = true, env = "TRAINING_DB_URL", default_value = "sqlite://training.sqlite3")]
    pub db_url: String,

    /// Directory holding the local progress mirror
    #[arg(long, global = true, env = "TRAINING_MIRROR_DIR", default_value = ".training-mirror")]
    pub mirror_dir: PathBuf,

    #[arg(long, global = true, env = "TRAINING_USER_ID", default_value_t = 1)]
    pub user_id: u64,

    /// Confirm set updates against a remote API instead of the local database
    #[arg(long, global = true, env = "TRAINING_GATEWAY_URL")]
    pub gateway_url: Option<String>,
}

impl AppConfig {
    #[must_use]
    pub fn user(&self) -> UserId {
        UserId::new(self.user_id)
    }

    #[must_use]
    pub fn database_url(&self) -> String {
        normalize_sqlite_url(&self.db_url)
    }
}

/// Identifies one exercise in one week of a plan.
#[derive(Args, Debug, Clone, Copy)]
pub struct WeekTarget {
    #[arg(long)]
    pub plan: u64,
    #[arg(long)]
    pub exercise: u64,
    #[arg(long)]
    pub week: u32,
}

impl WeekTarget {
    #[must_use]
    pub fn plan_id(&self) -> PlanId {
        PlanId::new(self.plan)
    }

    #[must_use]
    pub fn exercise_id(&self) -> ExerciseId {
        ExerciseId::new(self.exercise)
    }
}

#[derive(Subcommand)]
pub enum Command {
    /// Create empty weekly records for every exercise of a plan
    Init {
        #[arg(long)]
        plan: u64,
        /// Plan length in weeks
        #[arg(long)]
        weeks: u32,
        /// Exercise ids, repeat or comma-separate
        #[arg(long = "exercise", value_delimiter = ',', required = true)]
        exercises: Vec<u64>,
        /// First day of week 1 (YYYY-MM-DD or RFC 3339); defaults to now
        #[arg(long, value_parser = parse_start)]
        start: Option<DateTime<Utc>>,
    },

    /// Show the record for one exercise and week, creating it if needed
    Show {
        #[command(flatten)]
        target: WeekTarget,
    },

    /// List every record of a plan
    List {
        #[arg(long)]
        plan: u64,
    },

    /// Change completed sets and wait for confirmation
    Sets {
        #[command(flatten)]
        target: WeekTarget,
        /// Sets to add (negative to undo)
        #[arg(long, default_value_t = 1, allow_negative_numbers = true)]
        add: i64,
        /// Planned sets for the exercise this week
        #[arg(long)]
        total: u32,
        /// Mark every set as done
        #[arg(long)]
        all: bool,
    },

    /// Manage weekly notes
    Note {
        #[command(subcommand)]
        action: NoteAction,
    },

    /// Per-week totals for a plan
    History {
        #[arg(long)]
        plan: u64,
        /// Planned sets per exercise as EXERCISE=SETS, repeatable
        #[arg(long = "total", value_parser = parse_total)]
        totals: Vec<(ExerciseId, u32)>,
    },

    /// Delete one weekly record and its notes
    Delete {
        #[command(flatten)]
        target: WeekTarget,
    },
}

#[derive(Subcommand)]
pub enum NoteAction {
    Add {
        #[command(flatten)]
        target: WeekTarget,
        text: String,
    },
    Edit {
        #[command(flatten)]
        target: WeekTarget,
        #[arg(long)]
        id: NoteId,
        text: String,
    },
    Delete {
        #[command(flatten)]
        target: WeekTarget,
        #[arg(long)]
        id: NoteId,
    },
}

fn parse_start(raw: &str) -> Result<DateTime<Utc>> {
    if let Ok(at) = DateTime::parse_from_rfc3339(raw) {
        return Ok(at.with_timezone(&Utc));
    }
    let day = NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .with_context(|| format!("invalid start date: {raw}"))?;
    Ok(day.and_hms_opt(0, 0, 0).unwrap_or_default().and_utc())
}

fn parse_total(raw: &str) -> Result<(ExerciseId, u32)> {
    let Some((exercise, sets)) = raw.split_once('=') else {
        bail!("expected EXERCISE=SETS, got {raw}");
    };
    let exercise = exercise
        .trim()
        .parse::<ExerciseId>()
        .with_context(|| format!("invalid exercise id in {raw}"))?;
    let sets = sets
        .trim()
        .parse::<u32>()
        .with_context(|| format!("invalid set count in {raw}"))?;
    Ok((exercise, sets))
}

/// Turn a bare path or `sqlite:` URL into an absolute `sqlite://` URL.
pub fn normalize_sqlite_url(raw: &str) -> String {
    let trimmed = raw.trim();
    if trimmed == "sqlite::memory:" || trimmed.starts_with("sqlite://") {
        return trimmed.to_owned();
    }

    let path_str = trimmed.strip_prefix("sqlite:").unwrap_or(trimmed);
    let path = Path::new(path_str);
    let absolute = if path.is_absolute() {
        path.to_path_buf()
    } else {
        std::env::current_dir()
            .unwrap_or_else(|_| PathBuf::from("."))
            .join(path)
    };
    format!("sqlite://{}", absolute.display())
}

/// Create the database file and its directory so the pool can open it.
///
/// # Errors
///
/// Fails for a URL without a path or when the file cannot be created.
pub fn prepare_sqlite_file(db_url: &str) -> Result<()> {
    if db_url == "sqlite::memory:" {
        return Ok(());
    }

    let Some(rest) = db_url.strip_prefix("sqlite://") else {
        bail!("invalid database url: {db_url}");
    };
    let path = rest.split('?').next().unwrap_or(rest);
    if path.is_empty() {
        bail!("invalid database url: {db_url}");
    }

    let path = Path::new(path);
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("creating {}", parent.display()))?;
    }
    if !path.exists() {
        std::fs::OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(false)
            .open(path)
            .with_context(|| format!("creating {}", path.display()))?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sqlite_urls_are_made_absolute() {
        assert_eq!(normalize_sqlite_url("sqlite:///tmp/a.db"), "sqlite:///tmp/a.db");
        assert_eq!(normalize_sqlite_url("sqlite:/tmp/b.db"), "sqlite:///tmp/b.db");
        assert_eq!(normalize_sqlite_url("sqlite::memory:"), "sqlite::memory:");
        assert!(normalize_sqlite_url("rel.db").starts_with("sqlite:///"));
    }

    #[test]
    fn totals_parse_as_pairs() {
        assert_eq!(parse_total("3=4").unwrap(), (ExerciseId::new(3), 4));
        assert!(parse_total("3").is_err());
        assert!(parse_total("x=4").is_err());
    }

    #[test]
    fn start_accepts_plain_dates() {
        let at = parse_start("2026-03-02").unwrap();
        assert_eq!(at.to_rfc3339(), "2026-03-02T00:00:00+00:00");
        assert!(parse_start("next monday").is_err());
    }

    #[test]
    fn cli_reads_sets_command() {
        let cli = Cli::try_parse_from([
            "training", "--user-id", "4", "sets", "--plan", "1", "--exercise", "2", "--week", "3",
            "--add", "-1", "--total", "5",
        ])
        .unwrap();
        assert_eq!(cli.config.user(), UserId::new(4));
        let Command::Sets { target, add, total, all } = cli.command else {
            panic!("expected sets");
        };
        assert_eq!(target.week, 3);
        assert_eq!((add, total, all), (-1, 5, false));
    }

    #[test]
    fn prepare_creates_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let url = format!("sqlite://{}", dir.path().join("nested/p.db").display());
        prepare_sqlite_file(&url).unwrap();
        assert!(dir.path().join("nested/p.db").exists());
    }
}
