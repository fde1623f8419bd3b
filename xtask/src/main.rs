use clap::Parser;
use color_eyre::Result;
use std::path::PathBuf;

mod depmap;

use depmap::DependencyMapQuery;

/// plugin-runtime dev tasks
#[derive(Debug, clap::Parser)]
struct Args {
    #[clap(subcommand)]
    cmd: Command,
}

#[derive(Debug, clap::Subcommand)]
enum Command {
    /// Compute the deduplicated set of local files transitively imported by
    /// one or more entry files.
    DepMap {
        /// Absolute entry path; repeatable.
        #[clap(long = "entry", required = true)]
        entries: Vec<PathBuf>,
        /// Absolute path to leave out of the walk; repeatable.
        #[clap(long = "exclude")]
        exclude: Vec<PathBuf>,
        /// Skip imports and re-exports that only carry types.
        #[clap(long)]
        skip_type_only: bool,
    },
}

fn main() -> Result<()> {
    color_eyre::install()?;
    Args::parse().cmd.run()
}

impl Command {
    fn run(&self) -> Result<()> {
        match self {
            Self::DepMap {
                entries,
                exclude,
                skip_type_only,
            } => {
                let query = DependencyMapQuery {
                    entries: entries.clone(),
                    exclude: exclude.clone(),
                    skip_type_only_dependencies: *skip_type_only,
                };
                let files = depmap::dependency_map(&query)?;
                for file in files {
                    println!("{}", file.display());
                }
                Ok(())
            }
        }
    }
}
