use clap::{Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use projecthub::applications::ApplicationLifecycle;
use projecthub::config::AppConfig;
use projecthub::models::{CreateUserInput, Role};
use projecthub::{api, db};

#[derive(Parser)]
#[command(name = "projecthub")]
#[command(about = "Project applications, kanban tasks and mentorship scheduling")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the HTTP server
    Serve {
        /// Port for HTTP API
        #[arg(short, long, default_value = "3000")]
        port: u16,

        /// Address to bind
        #[arg(long, default_value = "127.0.0.1")]
        host: String,
    },
    /// Manage users
    User {
        #[command(subcommand)]
        command: UserCommands,
    },
    /// Find accepted applications whose student is not enrolled
    Doctor {
        /// Enroll the affected students
        #[arg(long)]
        repair: bool,
    },
}

#[derive(Subcommand)]
enum UserCommands {
    /// Create a user and print a session token for it
    Add {
        #[arg(long)]
        name: String,

        /// STUDENT, TEACHER or ADMIN
        #[arg(long, value_parser = parse_role)]
        role: Role,

        #[arg(long)]
        email: Option<String>,
    },
}

fn parse_role(s: &str) -> Result<Role, String> {
    Role::from_str(s).ok_or_else(|| format!("unknown role '{s}' (expected STUDENT, TEACHER or ADMIN)"))
}

fn init_tracing() {
    let filter = tracing_subscriber::EnvFilter::new(
        std::env::var("RUST_LOG").unwrap_or_else(|_| "projecthub=debug,tower_http=debug".into()),
    );

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

fn open_database(config: &AppConfig) -> anyhow::Result<db::Database> {
    let path = config.resolve_database_path()?;
    tracing::debug!("Opening database at {}", path.display());
    let db = db::Database::open(path)?;
    db.migrate()?;
    Ok(db)
}

async fn serve(config: AppConfig, host: &str, port: u16) -> anyhow::Result<()> {
    let db = open_database(&config)?;
    let app = api::create_router(db, config);

    let listener = tokio::net::TcpListener::bind((host, port)).await?;
    tracing::info!("projecthub listening on http://{}", listener.local_addr()?);

    axum::serve(listener, app).await?;
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing();

    let config = AppConfig::from_env();

    match cli.command {
        Some(Commands::Serve { port, host }) => serve(config, &host, port).await?,
        None => serve(config, "127.0.0.1", 3000).await?,
        Some(Commands::User {
            command: UserCommands::Add { name, role, email },
        }) => {
            let db = open_database(&config)?;
            let user = db.create_user(CreateUserInput { name, email, role })?;
            let session = db.create_session(user.id)?;
            println!("user:  {} ({})", user.id, user.role);
            println!("token: {}", session.token);
        }
        Some(Commands::Doctor { repair }) => {
            let db = open_database(&config)?;
            let lifecycle = ApplicationLifecycle::new(db);
            let orphans = lifecycle.orphaned_acceptances()?;

            if orphans.is_empty() {
                println!("No orphaned acceptances found.");
                return Ok(());
            }

            println!("{} accepted application(s) without enrollment:", orphans.len());
            for orphan in &orphans {
                println!(
                    "  - application {} (project {}, student {})",
                    orphan.application_id, orphan.project_id, orphan.student_id
                );
            }

            if repair {
                let repaired = lifecycle.repair_orphaned_acceptances()?;
                println!("Enrolled {} student(s).", repaired);
            } else {
                println!("Run with --repair to enroll them.");
            }
        }
    }

    Ok(())
}
