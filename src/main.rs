use std::path::PathBuf;
use std::process;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use seq2chat::cmd;

#[derive(Parser)]
#[command(name = "seq2chat")]
#[command(version)]
#[command(about = "Chat service over a seq2seq translation model", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    Serve,
    Talk {
        text: String,
    },
    BuildVocab {
        #[arg(long)]
        corpus: PathBuf,
        #[arg(long)]
        output: PathBuf,
        #[arg(long, default_value_t = 40000)]
        max_size: usize,
        #[arg(long, default_value = "basic")]
        tokenizer: String,
        #[arg(long)]
        dict: Option<PathBuf>,
        #[arg(long)]
        normalize_digits: bool,
        #[arg(long)]
        overwrite: bool,
    },
    SampleData {
        #[arg(long)]
        src: PathBuf,
        #[arg(long)]
        tgt: PathBuf,
        #[arg(long, default_value_t = 1000)]
        size: usize,
        #[arg(long, default_value = "dev")]
        prefix: String,
    },
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("seq2chat=info")),
        )
        .init();

    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Serve => cmd::serve().await,
        Commands::Talk { text } => cmd::talk(&text).await,
        Commands::BuildVocab {
            corpus,
            output,
            max_size,
            tokenizer,
            dict,
            normalize_digits,
            overwrite,
        } => {
            cmd::build_vocab(
                &corpus,
                &output,
                max_size,
                &tokenizer,
                dict.as_deref(),
                normalize_digits,
                overwrite,
            )
            .await
        }
        Commands::SampleData {
            src,
            tgt,
            size,
            prefix,
        } => cmd::sample_data(&src, &tgt, size, &prefix).await,
    };

    if let Err(e) = result {
        eprintln!("Error: {}", e);
        process::exit(1);
    }
}
