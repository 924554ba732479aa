use std::env;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use uuid::Uuid;

use equiptrack::{
    auth::password,
    clock::SystemClock,
    config::AppConfig,
    db,
    domain::{Actor, Role, WorkflowKind},
    lifecycle::LifecycleEngine,
    store::PgStore,
};

const USAGE: &str = "Usage:\n  maintenance create-user <username> <admin|manager|user> [password]\n  maintenance purge-request <admin-username> <calibration|rental|maintenance> <request-id>";

fn main() -> Result<()> {
    dotenv::dotenv().ok();
    let args: Vec<String> = env::args().skip(1).collect();
    match args.first().map(String::as_str) {
        Some("create-user") => create_user(&args[1..]),
        Some("purge-request") => purge_request(&args[1..]),
        Some(cmd) => {
            eprintln!("Unknown command: {cmd}\n{USAGE}");
            std::process::exit(1);
        }
        None => {
            eprintln!("{USAGE}");
            std::process::exit(1);
        }
    }
}

fn engine() -> Result<LifecycleEngine> {
    let config = AppConfig::from_env()?;
    tracing::info!(
        component = "maintenance",
        database_url = %config.redacted_database_url(),
        "loaded equiptrack configuration"
    );
    let pool = db::init_pool_with_size(&config.database_url, 1)?;
    db::run_migrations(&pool)?;
    Ok(LifecycleEngine::new(
        Arc::new(PgStore::new(pool)),
        Arc::new(SystemClock),
        config.reminder_policy(),
    ))
}

fn create_user(args: &[String]) -> Result<()> {
    let (username, role) = match args {
        [username, role, ..] => (username, role),
        _ => bail!("{USAGE}"),
    };
    let role: Role = role.parse().context("invalid role")?;
    let (secret, generated) = match args.get(2) {
        Some(given) => (given.clone(), false),
        None => (password::generate_password(20), true),
    };
    let hash = password::hash_password(&secret)?;

    let user = engine()?.create_user(username, &hash, role)?;
    println!("Created {} user {} ({})", user.role, user.username, user.id);
    if generated {
        println!("Generated password: {secret}");
    }
    Ok(())
}

fn purge_request(args: &[String]) -> Result<()> {
    let (admin_name, kind, id) = match args {
        [admin_name, kind, id] => (admin_name, kind, id),
        _ => bail!("{USAGE}"),
    };
    let kind: WorkflowKind = kind.parse().context("invalid workflow kind")?;
    let id = Uuid::parse_str(id).context("invalid request id")?;

    let engine = engine()?;
    let admin = engine
        .user_by_username(admin_name)?
        .with_context(|| format!("no user named {admin_name}"))?;
    let actor = Actor::new(admin.id, admin.role);

    let report = engine.purge_request(Some(&actor), kind, id)?;
    println!(
        "Purged {} request {}: {} history rows, {} documents, {} reminders removed",
        kind, report.request_id, report.deleted_history_rows, report.deleted_documents, report.cancelled_reminders
    );
    if report.released_item {
        println!("Engaged item released");
    }
    Ok(())
}
