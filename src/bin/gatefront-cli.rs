use clap::{ArgGroup, Parser, Subcommand};
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION};
use serde_json::{json, Map, Value};

#[derive(Parser)]
#[command(name = "gatefront-cli")]
#[command(about = "Management CLI for the gatefront admin API", long_about = None)]
struct Cli {
    #[arg(short, long, default_value = "http://localhost:8081", env = "GATEFRONT_ADMIN_URL")]
    url: String,

    #[arg(short, long, env = "GATEFRONT_ADMIN_KEY")]
    key: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Check gateway status
    Status,
    /// List services (reconciles first)
    Services,
    /// Reconcile services against the configured source now
    Reconcile,
    /// Search users by email or name
    Users {
        #[arg(long)]
        q: Option<String>,
        #[arg(long)]
        limit: Option<usize>,
        #[arg(long)]
        offset: Option<usize>,
    },
    /// Set or clear a user's role
    SetRole {
        user_id: String,
        /// Omit to clear the role
        role: Option<String>,
    },
    /// Show a user's effective overrides for every service
    Policies { user_id: String },
    /// Create or update a user's override for one service
    #[command(group(ArgGroup::new("access").args(["allow", "deny", "inherit"])))]
    SetPolicy {
        user_id: String,
        service_id: String,
        #[arg(long)]
        allow: bool,
        #[arg(long)]
        deny: bool,
        /// Fall back to the service default
        #[arg(long)]
        inherit: bool,
        #[arg(long)]
        window: Option<u32>,
        #[arg(long)]
        max: Option<u32>,
        /// Clear the rate-limit override
        #[arg(long, conflicts_with_all = ["window", "max"])]
        clear_limit: bool,
    },
    /// Query the access log
    Logs {
        #[arg(long)]
        user_id: Option<String>,
        #[arg(long)]
        service_id: Option<String>,
        #[arg(long)]
        host: Option<String>,
        /// RFC 3339 timestamp
        #[arg(long)]
        from: Option<String>,
        /// RFC 3339 timestamp
        #[arg(long)]
        to: Option<String>,
        #[arg(long)]
        limit: Option<usize>,
        #[arg(long)]
        offset: Option<usize>,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let client = reqwest::Client::new();
    let base = cli.url.trim_end_matches('/').to_string();

    let mut headers = HeaderMap::new();
    headers.insert(
        AUTHORIZATION,
        HeaderValue::from_str(&format!("Bearer {}", cli.key))?,
    );

    let request = match cli.command {
        Commands::Status => client.get(format!("{base}/admin/status")),
        Commands::Services => client.get(format!("{base}/admin/services")),
        Commands::Reconcile => client.post(format!("{base}/admin/services/reconcile")),
        Commands::Users { q, limit, offset } => {
            let mut query = Vec::new();
            push_param(&mut query, "q", q);
            push_param(&mut query, "limit", limit);
            push_param(&mut query, "offset", offset);
            client.get(format!("{base}/admin/users")).query(&query)
        }
        Commands::SetRole { user_id, role } => client
            .patch(format!("{base}/admin/users/{user_id}/role"))
            .json(&json!({ "role": role })),
        Commands::Policies { user_id } => {
            client.get(format!("{base}/admin/users/{user_id}/policies"))
        }
        Commands::SetPolicy {
            user_id,
            service_id,
            allow,
            deny,
            inherit,
            window,
            max,
            clear_limit,
        } => {
            let mut body = Map::new();
            if allow {
                body.insert("allow".into(), Value::Bool(true));
            } else if deny {
                body.insert("allow".into(), Value::Bool(false));
            } else if inherit {
                body.insert("allow".into(), Value::Null);
            }
            if clear_limit {
                body.insert("rateLimitWindowSec".into(), Value::Null);
                body.insert("rateLimitMax".into(), Value::Null);
            }
            if let Some(window) = window {
                body.insert("rateLimitWindowSec".into(), json!(window));
            }
            if let Some(max) = max {
                body.insert("rateLimitMax".into(), json!(max));
            }
            client
                .put(format!("{base}/admin/users/{user_id}/policies/{service_id}"))
                .json(&Value::Object(body))
        }
        Commands::Logs {
            user_id,
            service_id,
            host,
            from,
            to,
            limit,
            offset,
        } => {
            let mut query = Vec::new();
            push_param(&mut query, "userId", user_id);
            push_param(&mut query, "serviceId", service_id);
            push_param(&mut query, "host", host);
            push_param(&mut query, "from", from);
            push_param(&mut query, "to", to);
            push_param(&mut query, "limit", limit);
            push_param(&mut query, "offset", offset);
            client.get(format!("{base}/admin/logs")).query(&query)
        }
    };

    let res = request.headers(headers).send().await?;
    print_response(res).await
}

fn push_param<T: ToString>(query: &mut Vec<(&'static str, String)>, name: &'static str, value: Option<T>) {
    if let Some(value) = value {
        query.push((name, value.to_string()));
    }
}

async fn print_response(res: reqwest::Response) -> Result<(), Box<dyn std::error::Error>> {
    let status = res.status();
    if !status.is_success() {
        eprintln!("Error: Admin API returned status {}", status);
        if let Ok(text) = res.text().await {
            eprintln!("Response: {}", text);
        }
        std::process::exit(1);
    }

    let json: Value = res.json().await?;
    println!("{}", serde_json::to_string_pretty(&json)?);
    Ok(())
}
