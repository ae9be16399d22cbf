use std::process::ExitCode;

use clap::{Parser, Subcommand};
use serde::Serialize;
use tracing::error;
use tracing_subscriber::EnvFilter;

use tapfi::backend::PaymentRequestClient;
use tapfi::{
    AppContext, ChainRegistry, Config, Error, NewPaymentRequest, PaymentIntent, PaymentLink,
    PaymentRequests,
};

/// TapFi payment tools
#[derive(Parser, Debug)]
#[command(name = "tapfi")]
#[command(about = "Token directory, payment links and payment status from the command line")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Create or read payment deep links
    Link {
        #[command(subcommand)]
        action: LinkAction,
    },
    /// List spendable tokens on a chain
    Tokens { chain_id: u64 },
    /// Search a chain's tokens by symbol, name or address
    Search { chain_id: u64, query: String },
    /// Balance of a token held by an address
    Balance {
        chain_id: u64,
        symbol: String,
        address: String,
    },
    /// Follow a submitted transaction until it confirms or fails
    Watch { tx_hash: String, wallet: String },
    /// Recent transactions of an address on the default chain
    History { address: String },
    /// Payment requests stored by the TapFi backend
    Request {
        #[command(subcommand)]
        action: RequestAction,
    },
}

#[derive(Subcommand, Debug)]
enum RequestAction {
    Create {
        /// Recipient wallet address
        #[arg(long)]
        to: String,
        #[arg(long)]
        amount: String,
        #[arg(long, default_value = "ETH")]
        token: String,
        #[arg(long)]
        message: Option<String>,
        /// Recipient display name
        #[arg(long)]
        name: Option<String>,
    },
    Get { id: String },
    /// Mark a request paid by a transaction
    Complete { id: String, tx_hash: String },
    /// Received-payment summary of a wallet
    Stats { wallet: String },
}

#[derive(Subcommand, Debug)]
enum LinkAction {
    Encode {
        /// Recipient wallet address
        #[arg(long)]
        to: String,
        #[arg(long)]
        amount: String,
        #[arg(long, default_value = "ETH")]
        token: String,
        #[arg(long)]
        message: Option<String>,
        /// Recipient display name
        #[arg(long)]
        name: Option<String>,
        /// Address the payer will pay from; defaults to the recipient
        #[arg(long)]
        from: Option<String>,
    },
    Decode { url: String },
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    match run(cli.command).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            error!(error = %err, "command failed");
            eprintln!("{}", err.user_message());
            ExitCode::FAILURE
        }
    }
}

async fn run(command: Command) -> Result<(), Error> {
    let config = Config::from_env()?;

    match command {
        Command::Link { action } => link(action, &config),
        Command::Tokens { chain_id } => {
            let ctx = AppContext::from_config(config)?;
            print_json(&ctx.directory().list_tokens(chain_id).await?)
        }
        Command::Search { chain_id, query } => {
            let ctx = AppContext::from_config(config)?;
            let directory = ctx.directory();
            let tokens = directory.list_tokens(chain_id).await?;
            print_json(&directory.search_tokens(chain_id, &query, &tokens))
        }
        Command::Balance {
            chain_id,
            symbol,
            address,
        } => {
            let ctx = AppContext::from_config(config)?;
            let record = ctx
                .directory()
                .refresh_balance(chain_id, &symbol, &address)
                .await
                .ok_or_else(|| Error::UpstreamUnavailable("balance unavailable".to_string()))?;
            print_json(&record)
        }
        Command::Watch { tx_hash, wallet } => {
            let ctx = AppContext::from_config(config)?;
            let mut watch = ctx.poller().watch(&tx_hash, &wallet);
            while let Some(status) = watch.next().await {
                println!("{status}");
            }
            if let Some(url) = ctx.chains().tx_url(ctx.config().default_chain_id, &tx_hash) {
                println!("{url}");
            }
            Ok(())
        }
        Command::History { address } => {
            let ctx = AppContext::from_config(config)?;
            print_json(&ctx.explorer()?.transaction_history(&address).await?)
        }
        Command::Request { action } => request(action, &config).await,
    }
}

async fn request(action: RequestAction, config: &Config) -> Result<(), Error> {
    let backend = PaymentRequestClient::new(reqwest::Client::new(), &config.api_base_url)?;
    match action {
        RequestAction::Create {
            to,
            amount,
            token,
            message,
            name,
        } => {
            let intent = PaymentIntent::new(&to, &amount, &token, message.as_deref(), &to)?;
            let created = backend
                .create(&NewPaymentRequest::from_intent(&intent, name.as_deref()))
                .await?;
            print_json(&created)
        }
        RequestAction::Get { id } => print_json(&backend.get(&id).await?),
        RequestAction::Complete { id, tx_hash } => {
            print_json(&backend.complete(&id, &tx_hash).await?)
        }
        RequestAction::Stats { wallet } => print_json(&backend.stats(&wallet).await?),
    }
}

fn link(action: LinkAction, config: &Config) -> Result<(), Error> {
    match action {
        LinkAction::Encode {
            to,
            amount,
            token,
            message,
            name,
            from,
        } => {
            let payer = from.as_deref().unwrap_or(&to);
            let intent = PaymentIntent::new(&to, &amount, &token, message.as_deref(), payer)?;
            let chains = ChainRegistry::builtin()?;
            config.validate(&chains)?;
            let link = PaymentLink::for_chain(
                &intent,
                chains.get(config.default_chain_id)?,
                name.as_deref(),
            )?;
            println!("{}", link.encode(&config.app_origin)?);
            Ok(())
        }
        LinkAction::Decode { url } => {
            let chains = ChainRegistry::builtin()?;
            print_json(&PaymentLink::decode_for(&url, &chains)?)
        }
    }
}

fn print_json<T: Serialize>(value: &T) -> Result<(), Error> {
    let out = serde_json::to_string_pretty(value)?;
    println!("{out}");
    Ok(())
}
