use clap::Parser;

#[allow(clippy::upper_case_acronyms)]
#[derive(Parser, Debug)]
#[clap(name = "pgsink", about, version)]
pub struct CLI {
    #[clap(subcommand)]
    pub command: Commands,

    /// Increase log verbosity, `-v` for debug and `-vv` for trace.
    #[clap(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,
}

#[derive(Parser, Debug)]
#[clap(
    about = "Batch write records into PostgreSQL with insert or upsert semantics",
    long_about = None
)]
pub enum Commands {
    /// Lists the destination tables with their columns and primary key constraints.
    ///
    /// Example:
    /// `pgsink tables`
    #[clap(name = "tables")]
    Tables {
        /// optional - The path to run the command in, default will be where the command is run.
        #[clap(long, short)]
        path: Option<String>,
    },

    /// Writes newline-delimited JSON rows into a destination table.
    ///
    /// Tables with a primary key are upserted, all others are inserted into. Identity columns
    /// (`_row_id`, `_parent_row_id`) are rehashed with the run salt before they are written.
    ///
    /// Example:
    /// `pgsink write --table test_data --input rows.jsonl --salt run-1`
    #[clap(name = "write")]
    Write {
        /// The destination table.
        #[clap(long, short)]
        table: String,

        /// Newline-delimited JSON file, one object per row.
        #[clap(long, short)]
        input: String,

        /// optional - Overrides `writer.identity_salt` from pgsink.yaml.
        #[clap(long, short)]
        salt: Option<String>,

        /// optional - Overrides `writer.batch_size` from pgsink.yaml.
        #[clap(long, short)]
        batch_size: Option<usize>,

        /// optional - The path to run the command in, default will be where the command is run.
        #[clap(long, short)]
        path: Option<String>,
    },
}
