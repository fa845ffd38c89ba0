use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Log layout building, memory growth and evaluation at debug level
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Print the byte layout of a schema class
    Layout {
        /// Schema definition (JSON)
        #[arg(short, long)]
        schema: PathBuf,

        /// Class to lay out
        #[arg(short, long)]
        class: String,

        /// Print a JSON property table instead of the text dump
        #[arg(long)]
        json: bool,
    },

    /// Build an instance from JSON values and print its annotated memory
    Dump {
        /// Schema definition (JSON)
        #[arg(short, long)]
        schema: PathBuf,

        /// Class of the instance
        #[arg(short, long)]
        class: String,

        /// Property values (JSON object)
        #[arg(long)]
        values: PathBuf,
    },

    /// Evaluate an expression against an instance built from JSON values
    Eval {
        /// Schema definition (JSON)
        #[arg(short, long)]
        schema: PathBuf,

        /// Class of the instance
        #[arg(short, long)]
        class: String,

        /// Property values (JSON object); the instance starts all-null without it
        #[arg(long)]
        values: Option<PathBuf>,

        /// Parse as an assignment and print the updated instance
        #[arg(short, long)]
        assign: bool,

        /// Expression text
        expression: String,
    },

    /// Parse an expression and print the reconstructed tree
    Parse {
        /// Parse as an assignment
        #[arg(short, long)]
        assign: bool,

        /// Expression text
        expression: String,
    },
}
