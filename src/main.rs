use clap::{Parser, ValueEnum};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::io::Read;
use std::net::SocketAddr;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

use crackteam::api::{CancelRequest, SubmitJobRequest};
use crackteam::config::{CoordinatorConfig, ServerConfig};
use crackteam::coordinator::{CreateOutcome, JobView, Strategy};
use crackteam::engine::EngineKind;
use crackteam::node::Node;
use crackteam::shutdown::install_shutdown_handler;

#[derive(Parser, Debug)]
#[command(name = "crackteam")]
#[command(version)]
#[command(about = "Team coordinator for distributed password-recovery jobs")]
#[command(propagate_version = true)]
struct Args {
    #[command(subcommand)]
    command: Commands,
}

#[derive(clap::Subcommand, Debug)]
enum Commands {
    /// Start a coordinator server
    Server(ServerArgs),

    /// Job management commands
    Job {
        #[command(flatten)]
        client: ClientArgs,

        #[command(subcommand)]
        command: JobCommands,
    },

    /// Parse engine status output read from stdin
    Parse {
        /// Engine that produced the output
        #[arg(long, short = 'e')]
        engine: EngineKind,
    },
}

// =============================================================================
// Server Arguments
// =============================================================================

#[derive(Parser, Debug)]
struct ServerArgs {
    /// Address to bind the HTTP and WebSocket server to
    #[arg(long, env = "CRACKTEAM_HOST", default_value = "127.0.0.1")]
    host: String,

    /// Port to listen on
    #[arg(long, env = "CRACKTEAM_PORT", default_value = "8080")]
    port: u16,

    /// Reclaim assignments silent for this many milliseconds
    #[arg(long, env = "CRACKTEAM_STALE_AFTER_MS", default_value = "30000")]
    stale_after_ms: u64,

    /// Minimum gap between progress broadcasts for one job
    #[arg(long, env = "CRACKTEAM_PROGRESS_INTERVAL_MS", default_value = "1000")]
    progress_interval_ms: u64,

    /// How often to sweep for stale work
    #[arg(long, env = "CRACKTEAM_SWEEP_INTERVAL_MS", default_value = "5000")]
    sweep_interval_ms: u64,

    /// How long finished jobs stay queryable
    #[arg(long, env = "CRACKTEAM_JOB_RETENTION_SECS", default_value = "3600")]
    job_retention_secs: u64,

    /// File the result cache is loaded from and saved to
    #[arg(long, env = "CRACKTEAM_CACHE_FILE")]
    cache_file: Option<PathBuf>,

    /// Directory that wordlist references resolve against
    #[arg(long, env = "CRACKTEAM_WORDLIST_DIR")]
    wordlist_dir: Option<PathBuf>,

    /// Accept any peer without team membership. Development only.
    #[arg(long, env = "CRACKTEAM_OPEN_ENROLLMENT")]
    open_enrollment: bool,
}

// =============================================================================
// Client Arguments
// =============================================================================

#[derive(Parser, Debug)]
struct ClientArgs {
    /// Server address
    #[arg(long, short = 'a', env = "CRACKTEAM_ADDR", default_value = "http://127.0.0.1:8080")]
    addr: String,

    /// Output format
    #[arg(long, short = 'o', default_value = "table")]
    output: OutputFormat,
}

#[derive(Debug, Clone, ValueEnum)]
enum OutputFormat {
    Table,
    Json,
}

// =============================================================================
// Job Commands
// =============================================================================

#[derive(clap::Subcommand, Debug)]
enum JobCommands {
    /// Submit a hash for the team to crack
    Submit {
        /// The hash to recover
        hash: String,

        /// Team the job belongs to
        #[arg(long, short = 't')]
        team: String,

        /// Member submitting the job
        #[arg(long, short = 'u')]
        user: String,

        /// Wordlist references, split across all connected peers
        #[arg(long, short = 'w', required = true, num_args = 1..)]
        wordlist: Vec<String>,

        /// Attack strategy
        #[arg(long, short = 's', default_value = "dictionary")]
        strategy: Strategy,
    },
    /// Get status of a specific job
    Status {
        /// The job ID (UUID)
        job_id: String,
    },
    /// Cancel a running job
    Cancel {
        /// The job ID (UUID)
        job_id: String,

        /// Reason reported to peers
        #[arg(long, short = 'r')]
        reason: Option<String>,
    },
    /// List all jobs
    List,
}

// =============================================================================
// JSON Output Types
// =============================================================================

#[derive(Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CancelOutput {
    job_id: String,
    cancelled: bool,
}

#[derive(Deserialize)]
struct ErrorBody {
    error: String,
    code: String,
}

// =============================================================================
// HTTP Client
// =============================================================================

struct ApiClient {
    http: reqwest::Client,
    base: String,
}

impl ApiClient {
    fn new(args: &ClientArgs) -> Self {
        Self {
            http: reqwest::Client::new(),
            base: args.addr.trim_end_matches('/').to_string(),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base, path)
    }

    async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T, Box<dyn std::error::Error>> {
        let response = self.http.get(self.url(path)).send().await?;
        decode(response).await
    }

    async fn post<B: Serialize, T: DeserializeOwned>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<T, Box<dyn std::error::Error>> {
        let response = self.http.post(self.url(path)).json(body).send().await?;
        decode(response).await
    }
}

/// Decode a success body, or turn the server's error body into an error.
async fn decode<T: DeserializeOwned>(
    response: reqwest::Response,
) -> Result<T, Box<dyn std::error::Error>> {
    let status = response.status();
    if status.is_success() {
        return Ok(response.json().await?);
    }
    let text = response.text().await?;
    match serde_json::from_str::<ErrorBody>(&text) {
        Ok(body) => Err(format!("{} ({}): {}", status, body.code, body.error).into()),
        Err(_) => Err(format!("{}: {}", status, text).into()),
    }
}

// =============================================================================
// Server Implementation
// =============================================================================

async fn run_server(args: ServerArgs) -> Result<(), Box<dyn std::error::Error>> {
    let listen_addr: SocketAddr = format!("{}:{}", args.host, args.port).parse()?;

    let coordinator = CoordinatorConfig::default()
        .with_stale_after_ms(args.stale_after_ms)
        .with_progress_interval_ms(args.progress_interval_ms)
        .with_sweep_interval_ms(args.sweep_interval_ms)
        .with_job_retention_secs(args.job_retention_secs);

    let mut config = ServerConfig::new(listen_addr)
        .with_coordinator(coordinator)
        .with_open_enrollment(args.open_enrollment);
    if let Some(path) = args.cache_file {
        config = config.with_cache_path(path);
    }
    if let Some(dir) = args.wordlist_dir {
        config = config.with_wordlist_dir(dir);
    }

    tracing::info!(
        listen_addr = %config.listen_addr,
        stale_after_ms = config.coordinator.stale_after_ms,
        progress_interval_ms = config.coordinator.progress_interval_ms,
        sweep_interval_ms = config.coordinator.sweep_interval_ms,
        cache_file = ?config.cache_path,
        wordlist_dir = ?config.wordlist_dir,
        "Starting crackteam coordinator"
    );

    let node = Node::new(config)?;
    let shutdown = install_shutdown_handler();
    node.run(shutdown).await?;

    tracing::info!("Coordinator stopped");
    Ok(())
}

// =============================================================================
// Client Command Handlers
// =============================================================================

async fn handle_job_submit(
    client: &ApiClient,
    request: SubmitJobRequest,
    output_format: &OutputFormat,
) -> Result<(), Box<dyn std::error::Error>> {
    let outcome: CreateOutcome = client.post("/api/jobs", &request).await?;

    match output_format {
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(&outcome)?);
        }
        OutputFormat::Table => match &outcome {
            CreateOutcome::Created { job_id } => {
                println!("Job submitted successfully!");
                println!("Job ID: {}", job_id);
            }
            CreateOutcome::Joined { job_id } => {
                println!("Hash is already being cracked, joined existing job.");
                println!("Job ID: {}", job_id);
            }
            CreateOutcome::Cached { job_id, plaintext } => {
                println!("Hash already solved.");
                println!("Job ID:    {}", job_id);
                println!("Plaintext: {}", plaintext);
            }
        },
    }
    Ok(())
}

async fn handle_job_status(
    client: &ApiClient,
    job_id: String,
    output_format: &OutputFormat,
) -> Result<(), Box<dyn std::error::Error>> {
    let job: JobView = client.get(&format!("/api/jobs/{}", job_id)).await?;

    match output_format {
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(&job)?);
        }
        OutputFormat::Table => {
            println!("Job ID:      {}", job.id);
            println!("Team:        {}", job.team_id);
            println!("Status:      {}", job.status);
            println!("Hash Type:   {}", job.hash_type_info.hash_type);
            println!("Strategy:    {}", job.strategy);
            println!("Progress:    {:.1}%", job.progress_percent);
            println!(
                "Chunks:      {} total, {} pending",
                job.total_chunks, job.pending_chunks
            );
            if let Some(result) = &job.result {
                println!("Plaintext:   {}", result.plaintext);
                println!("Solved By:   {}", result.solved_by);
                if let Some(engine) = &result.engine {
                    println!("Engine:      {}", engine);
                }
            }
            if let Some(message) = &job.message {
                println!("Message:     {}", message);
            }
            if !job.assignments.is_empty() {
                println!();
                println!("{:<24} {:<24} {:<10} PROGRESS", "PEER", "CHUNK", "STATUS");
                println!("{}", "-".repeat(70));
                for assignment in &job.assignments {
                    println!(
                        "{:<24} {:<24} {:<10} {:.1}%",
                        truncate(&assignment.peer_id, 23),
                        truncate(&assignment.chunk.to_string(), 23),
                        assignment.status.to_string(),
                        assignment.progress_percent
                    );
                }
            }
        }
    }
    Ok(())
}

async fn handle_job_cancel(
    client: &ApiClient,
    job_id: String,
    reason: Option<String>,
    output_format: &OutputFormat,
) -> Result<(), Box<dyn std::error::Error>> {
    let output: CancelOutput = client
        .post(&format!("/api/jobs/{}/cancel", job_id), &CancelRequest { reason })
        .await?;

    match output_format {
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(&output)?);
        }
        OutputFormat::Table => {
            if output.cancelled {
                println!("Job {} cancelled.", output.job_id);
            } else {
                println!("Job {} was not running.", output.job_id);
            }
        }
    }
    Ok(())
}

async fn handle_job_list(
    client: &ApiClient,
    output_format: &OutputFormat,
) -> Result<(), Box<dyn std::error::Error>> {
    let jobs: Vec<JobView> = client.get("/api/jobs").await?;

    match output_format {
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(&jobs)?);
        }
        OutputFormat::Table => {
            if jobs.is_empty() {
                println!("No jobs found.");
                return Ok(());
            }
            println!(
                "{:<38} {:<10} {:<9} {:<8} HASH",
                "JOB ID", "STATUS", "PROGRESS", "PEERS"
            );
            println!("{}", "-".repeat(90));
            for job in &jobs {
                println!(
                    "{:<38} {:<10} {:<9} {:<8} {}",
                    job.id.to_string(),
                    job.status.to_string(),
                    format!("{:.1}%", job.progress_percent),
                    job.assignments.len(),
                    truncate(&job.fingerprint, 30)
                );
            }
            println!();
            println!("Showing {} jobs", jobs.len());
        }
    }
    Ok(())
}

fn handle_parse(engine: EngineKind) -> Result<(), Box<dyn std::error::Error>> {
    let mut raw = String::new();
    std::io::stdin().read_to_string(&mut raw)?;
    let progress = engine.parse(&raw);
    println!("{}", serde_json::to_string_pretty(&progress)?);
    Ok(())
}

fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() > max {
        let head: String = s.chars().take(max.saturating_sub(3)).collect();
        format!("{}...", head)
    } else {
        s.to_string()
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    match args.command {
        Commands::Server(server_args) => {
            run_server(server_args).await?;
        }
        Commands::Job { client, command } => {
            let api = ApiClient::new(&client);

            match command {
                JobCommands::Submit {
                    hash,
                    team,
                    user,
                    wordlist,
                    strategy,
                } => {
                    let request = SubmitJobRequest {
                        team_id: team,
                        requested_by: user,
                        hash,
                        hash_type: None,
                        wordlists: wordlist,
                        strategy,
                    };
                    handle_job_submit(&api, request, &client.output).await?;
                }
                JobCommands::Status { job_id } => {
                    handle_job_status(&api, job_id, &client.output).await?;
                }
                JobCommands::Cancel { job_id, reason } => {
                    handle_job_cancel(&api, job_id, reason, &client.output).await?;
                }
                JobCommands::List => {
                    handle_job_list(&api, &client.output).await?;
                }
            }
        }
        Commands::Parse { engine } => {
            handle_parse(engine)?;
        }
    }

    Ok(())
}
