use clap::{Parser, Subcommand};

/// passgate — challenge-verification gate with short-lived access passes
#[derive(Parser)]
#[command(name = "passgate", version, about)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Start the gate server
    Serve {
        /// Port to bind (overrides PASSGATE_PORT)
        #[arg(short, long, env = "PASSGATE_PORT")]
        port: Option<u16>,
    },

    /// Print the effective pass settings after clamping, then exit
    CheckConfig,
}
