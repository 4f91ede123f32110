use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};
use obscurex_agent::{
    Agent, AgentConfigBuilder, AgentError, CancellationFlag, OptimizationConfig, OptimizationLoop,
    QueryRequest,
};
use obscurex_core::SessionId;
use serde_json::Value;

#[derive(Parser, Debug)]
#[command(name = "obscurex", version)]
#[command(about = "ObscureX - tool-dispatching agent with an ML pipeline optimization loop")]
struct Cli {
    /// Log output format
    #[arg(long, value_enum, default_value_t = LogFormat::Json, global = true)]
    log_format: LogFormat,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum)]
enum LogFormat {
    Json,
    Pretty,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// List registered tools as JSON
    Tools,
    /// Invoke a single tool and print its envelope
    Invoke {
        /// Tool name
        tool: String,
        /// Parameters as a JSON object
        #[arg(long, default_value = "{}")]
        params: String,
    },
    /// Run the pipeline optimization loop
    Optimize {
        /// Data file mentioned in the first generation prompt
        #[arg(long)]
        data_file: Option<PathBuf>,
        /// Stop once the best objective is at or below this value
        #[arg(long, default_value_t = 0.1)]
        threshold: f64,
        #[arg(long, default_value_t = 50)]
        max_iterations: u32,
        /// Prompt for the first generation
        #[arg(long)]
        prompt: Option<String>,
        /// Only print the final report
        #[arg(long)]
        quiet: bool,
    },
    /// Ask the tool-using agent a question
    Query {
        prompt: String,
        #[arg(long, default_value = "cli")]
        user: String,
        /// Continue an existing session
        #[arg(long)]
        session: Option<String>,
    },
    /// Inspect memory
    Memory {
        #[command(subcommand)]
        memory_command: MemoryCommands,
    },
}

#[derive(Subcommand, Debug)]
enum MemoryCommands {
    /// Case-insensitive search over keys, values and metadata
    Search {
        query: String,
        /// Search long-term memory instead of short-term
        #[arg(long)]
        long_term: bool,
    },
}

#[derive(Debug, thiserror::Error)]
enum CliError {
    #[error(transparent)]
    Agent(#[from] AgentError),

    #[error("invalid --params: {0}")]
    Params(#[from] serde_json::Error),

    #[error("{0}")]
    ToolFailed(String),
}

fn init_logging(format: LogFormat) {
    let env_filter = tracing_subscriber::EnvFilter::from_default_env();
    let env_filter = match "info".parse() {
        Ok(directive) => env_filter.add_directive(directive),
        Err(_) => env_filter,
    };

    let builder = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr);
    let _ = match format {
        LogFormat::Json => builder.json().try_init(),
        LogFormat::Pretty => builder.pretty().try_init(),
    };
}

fn print_json(value: &impl serde::Serialize) {
    match serde_json::to_string_pretty(value) {
        Ok(text) => println!("{text}"),
        Err(e) => tracing::error!(error = %e, "Failed to render output"),
    }
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    init_logging(cli.log_format);

    if let Err(e) = run(cli.command).await {
        tracing::error!(error = %e, "Command failed");
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}

async fn run(command: Commands) -> Result<(), CliError> {
    let config = AgentConfigBuilder::from_env()
        .and_then(AgentConfigBuilder::build)
        .map_err(AgentError::from)?;
    let agent = Agent::from_config(config)?;

    match command {
        Commands::Tools => print_json(&agent.list_tools()),
        Commands::Invoke { tool, params } => {
            let params: Value = serde_json::from_str(&params)?;
            let envelope = agent.execute_tool(&tool, params).await;
            print_json(&envelope);
            if !envelope.success {
                return Err(CliError::ToolFailed(
                    envelope.error.unwrap_or_else(|| format!("tool '{tool}' failed")),
                ));
            }
        }
        Commands::Optimize {
            data_file,
            threshold,
            max_iterations,
            prompt,
            quiet,
        } => {
            let defaults = OptimizationConfig::default();
            let config = OptimizationConfig {
                initial_prompt: prompt.unwrap_or(defaults.initial_prompt),
                threshold,
                max_iterations,
                data_file,
                verbose: !quiet,
                ..OptimizationConfig::default()
            };
            optimize(&agent, config).await?;
        }
        Commands::Query {
            prompt,
            user,
            session,
        } => {
            let runner = agent.runner()?;
            let mut request = QueryRequest::new(prompt, user);
            if let Some(id) = session {
                request = request.in_session(SessionId::new(id));
            }
            print_json(&runner.query(request).await?);
        }
        Commands::Memory { memory_command } => match memory_command {
            MemoryCommands::Search { query, long_term } => {
                let tool = if long_term {
                    "searchLongTermMemory"
                } else {
                    "searchMemory"
                };
                let envelope = agent
                    .execute_tool(tool, serde_json::json!({ "query": query }))
                    .await;
                print_json(&envelope);
            }
        },
    }
    Ok(())
}

async fn optimize(agent: &Agent, config: OptimizationConfig) -> Result<(), CliError> {
    let cancel = CancellationFlag::new();
    let on_interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("Interrupt received, stopping after the current iteration");
            on_interrupt.cancel();
        }
    });

    let verbose = config.verbose;
    let mut run = OptimizationLoop::new(agent.dispatcher(), config).with_cancellation(cancel);
    if verbose {
        run = run.with_observer(|record| match serde_json::to_string(record) {
            Ok(line) => println!("{line}"),
            Err(e) => tracing::warn!(error = %e, "Failed to render iteration"),
        });
    }
    let report = run.run().await.map_err(AgentError::from)?;
    print_json(&report);
    Ok(())
}
