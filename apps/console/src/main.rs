use std::{path::PathBuf, sync::Arc};

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use client_core::{
    config::load_settings_from,
    form::CacheLoad,
    reports::download_name,
    CriteriaCache, Dialogs, FormController, HttpApiClient, Listing, NotificationCenter, Reports,
    ReviewDesk, Session, StagedFile, SubmitMode, SubmitOutcome,
};
use shared::{
    domain::{ActivityId, ActivityStatus, MainCriterionId, ReportFileId, SubCriterionId},
    protocol::{Activity, ReportFilters, ReportType},
};
use tracing_subscriber::EnvFilter;

mod console_dialogs;
mod draft_file;

use console_dialogs::ConsoleDialogs;
use draft_file::DraftFile;

#[derive(Parser, Debug)]
#[command(about = "Command-line client for the achievements service")]
struct Cli {
    #[arg(long, default_value = client_core::config::SETTINGS_FILE)]
    config: PathBuf,
    /// Access token to keep in the session for this and later runs.
    #[arg(long)]
    token: Option<String>,
    /// Cached user object (JSON) that goes with the token.
    #[arg(long)]
    user_json: Option<String>,
    /// Answer yes to every confirmation.
    #[arg(long, short = 'y')]
    yes: bool,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// All activities, optionally filtered locally.
    List {
        #[arg(long)]
        search: Option<String>,
        #[arg(long, value_parser = parse_status)]
        status: Option<ActivityStatus>,
    },
    Drafts,
    Archived,
    /// Main criteria, or the sub criteria of one main criterion.
    Criteria {
        #[arg(long)]
        main: Option<String>,
    },
    /// Sends the activity described in a TOML file.
    Submit {
        file: PathBuf,
        #[arg(long = "attach")]
        attachments: Vec<PathBuf>,
        /// Save as a draft instead of sending for review.
        #[arg(long)]
        draft: bool,
        /// Id of an existing draft to update.
        #[arg(long)]
        edit: Option<String>,
    },
    Approve {
        id: String,
    },
    Reject {
        id: String,
        #[arg(long, default_value = "")]
        reason: String,
    },
    /// Puts an approved or rejected activity back under review.
    Reassign {
        id: String,
    },
    Delete {
        id: String,
        /// The id is one of your drafts.
        #[arg(long)]
        draft: bool,
    },
    Stats,
    /// Latest approvals and submissions.
    Recent,
    Report {
        #[arg(long, value_enum, default_value_t = Format::Pdf)]
        format: Format,
        #[arg(long)]
        from: Option<String>,
        #[arg(long)]
        to: Option<String>,
        #[arg(long, value_parser = parse_status)]
        status: Option<ActivityStatus>,
        #[arg(long)]
        main: Option<String>,
        #[arg(long)]
        sub: Option<String>,
        #[arg(long)]
        user: Option<String>,
        /// Directory the generated PDF is downloaded into.
        #[arg(long, default_value = ".")]
        out: PathBuf,
    },
    /// Downloads the PDF generated last.
    LastPdf {
        #[arg(long, default_value = "")]
        title: String,
        #[arg(long, default_value = ".")]
        out: PathBuf,
    },
    Reports,
    ReportStats,
    DeleteReport {
        id: String,
    },
    Notifications {
        #[arg(long)]
        mark_all_read: bool,
        /// Delete every notification.
        #[arg(long, conflicts_with = "mark_all_read")]
        clear: bool,
    },
    Logout,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum Format {
    Pdf,
    Docx,
}

impl From<Format> for ReportType {
    fn from(format: Format) -> Self {
        match format {
            Format::Pdf => ReportType::Pdf,
            Format::Docx => ReportType::Docx,
        }
    }
}

fn parse_status(raw: &str) -> Result<ActivityStatus, String> {
    ActivityStatus::from_label(raw).ok_or_else(|| format!("unknown status '{raw}'"))
}

fn print_activities<'a>(activities: impl IntoIterator<Item = &'a Activity>) {
    for activity in activities {
        let id = activity.id.as_ref().map(ActivityId::as_str).unwrap_or("-");
        let user = activity
            .user
            .as_ref()
            .map(|user| user.full_name())
            .unwrap_or("-");
        println!("{id}\t{}\t{}\t{user}", activity.status, activity.title);
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .init();
    let cli = Cli::parse();

    let settings = load_settings_from(&cli.config)?;
    let session = Session::open(&settings.session_database_url).await?;
    if let Some(token) = &cli.token {
        session.set_token(token).await?;
    }
    if let Some(user_json) = &cli.user_json {
        session.set_user_json(user_json).await?;
    }

    let client = Arc::new(HttpApiClient::new(&settings, session.clone())?);
    let dialogs: Arc<dyn Dialogs> = Arc::new(ConsoleDialogs {
        assume_yes: cli.yes,
    });
    let criteria = CriteriaCache::new(client.clone());
    let mut desk = ReviewDesk::new(client.clone(), session.clone(), dialogs.clone());
    let reports = Reports::new(client.clone(), session.clone(), dialogs.clone());

    match cli.command {
        Command::List { search, status } => {
            desk.load(Listing::All).await?;
            desk.set_search(search.as_deref().unwrap_or_default());
            desk.set_status_filter(status);
            print_activities(desk.filtered());
        }
        Command::Drafts => {
            desk.load(Listing::Drafts).await?;
            print_activities(desk.activities());
        }
        Command::Archived => {
            desk.load(Listing::Archived).await?;
            print_activities(desk.activities());
        }
        Command::Criteria { main } => match main {
            Some(main_id) => {
                for sub in criteria.sub_criteria_for(&main_id).await? {
                    println!("{}\t{}", sub.id, sub.name);
                }
            }
            None => {
                for main in criteria.main_criteria().await?.iter() {
                    println!("{}\t{}", main.id, main.name);
                }
            }
        },
        Command::Submit {
            file,
            attachments,
            draft,
            edit,
        } => {
            let draft_file = DraftFile::load(&file).await?;
            let mut form = FormController::new(
                &settings,
                session.clone(),
                criteria.clone(),
                client.clone(),
                dialogs.clone(),
            );
            if let Some(id) = edit {
                desk.begin_edit(&ActivityId::new(id)).await?;
                form = form.with_edit_mode(true);
            }

            form.initialize().await;
            if form.is_edit_mode() && !matches!(form.load_from_cache().await, CacheLoad::Loaded) {
                bail!("could not load the draft being edited");
            }
            draft_file.apply(&mut form).await?;

            let mut staged = Vec::with_capacity(attachments.len());
            for path in &attachments {
                staged.push(StagedFile::from_path(path).await?);
            }
            if !staged.is_empty() {
                let outcome = form.add_files(staged).await?;
                if !outcome.rejected.is_empty() {
                    bail!("{} attachment(s) rejected", outcome.rejected.len());
                }
            }

            let mode = if draft {
                SubmitMode::DraftSave
            } else {
                SubmitMode::ReviewSubmit
            };
            match form.submit(mode).await {
                SubmitOutcome::Submitted { .. } => {}
                SubmitOutcome::Invalid(errors) => bail!("{} field(s) need attention", errors.len()),
                SubmitOutcome::Failed { message } => bail!(message),
            }
        }
        Command::Approve { id } => {
            desk.load(Listing::All).await?;
            desk.approve(&ActivityId::new(id)).await?;
        }
        Command::Reject { id, reason } => {
            desk.load(Listing::All).await?;
            desk.reject(&ActivityId::new(id), &reason).await?;
        }
        Command::Reassign { id } => {
            desk.load(Listing::All).await?;
            desk.reassign(&ActivityId::new(id)).await?;
        }
        Command::Delete { id, draft } => {
            let id = ActivityId::new(id);
            if draft {
                desk.load(Listing::Drafts).await?;
                desk.delete_draft(&id).await?;
            } else {
                desk.load(Listing::All).await?;
                desk.delete(&id).await?;
            }
        }
        Command::Stats => {
            let stats = desk.stats().await?;
            println!("total\t{}", stats.total_activities);
            println!("pending\t{}", stats.pending_activities);
            println!("approved\t{}", stats.approved_activities);
            println!("rejected\t{}", stats.rejected_activities);
            println!("drafts\t{}", stats.draft_activities);
        }
        Command::Recent => {
            for item in desk.recent().await? {
                println!("{}\t{}\t{}", item.id, item.time, item.message);
            }
        }
        Command::Report {
            format,
            from,
            to,
            status,
            main,
            sub,
            user,
            out,
        } => {
            let filters = ReportFilters {
                start_date: from,
                end_date: to,
                main_criterion: main.map(MainCriterionId::new),
                sub_criterion: sub.map(SubCriterionId::new),
                user,
                status,
                report_type: format.into(),
            };
            let report = reports.generate(&filters).await?;
            if report.report_type == ReportType::Pdf {
                let path = reports
                    .download(&report.filename, &out, &report.filename)
                    .await?;
                println!("{}", path.display());
            } else {
                println!("{}", report.file_url);
            }
        }
        Command::LastPdf { title, out } => {
            let (_, bytes) = reports.view_last_pdf().await?;
            let path = out.join(download_name(&title, chrono::Local::now().date_naive()));
            tokio::fs::write(&path, bytes)
                .await
                .with_context(|| format!("failed to write '{}'", path.display()))?;
            println!("{}", path.display());
        }
        Command::Reports => {
            for file in reports.files().await? {
                let id = file.id.as_ref().map(ReportFileId::as_str).unwrap_or("-");
                let created = file.created_at.as_deref().unwrap_or("-");
                println!("{id}\t{created}\t{}", file.url);
            }
        }
        Command::ReportStats => {
            let stats = reports.stats().await?;
            println!("total\t{}", stats.total_reports);
            println!("pdf\t{}", stats.pdf_count);
            println!("docx\t{}", stats.docx_count);
            println!("last\t{}", stats.last_generated.as_deref().unwrap_or("-"));
            println!("most active\t{}", stats.most_active_user.as_deref().unwrap_or("-"));
        }
        Command::DeleteReport { id } => {
            reports.delete_file(&ReportFileId::new(id)).await?;
        }
        Command::Notifications {
            mark_all_read,
            clear,
        } => {
            let center = NotificationCenter::new();
            center.sync(client.as_ref()).await?;
            if clear {
                center.sync_clear(client.as_ref()).await?;
            } else if mark_all_read {
                center.sync_mark_all_read(client.as_ref()).await?;
            }
            for notification in center.list().await {
                let marker = if notification.read { " " } else { "*" };
                println!("{marker} {}\t{}", notification.title, notification.message);
            }
        }
        Command::Logout => {
            session.logout().await?;
        }
    }

    Ok(())
}
