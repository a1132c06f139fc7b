#![warn(clippy::pedantic, elided_lifetimes_in_paths, explicit_outlives_requirements)]
#![allow(non_snake_case)]

use {
	anyhow::Context,
	clap::Parser,
	png_embedder::{config::Config, initLogging, scan},
	std::{
		io::{self, BufWriter, Write},
		path::PathBuf,
	},
	tracing::debug,
};

fn main() -> anyhow::Result<()> {
	/// Embeds every `.png` file of a directory into a C header/source pair.
	#[derive(Parser)]
	struct Args {
		/// Directory to scan
		#[clap(default_value = ".")]
		dir: PathBuf,

		/// Where the header and source are written [default: DIR]
		#[clap(long)]
		outDir: Option<PathBuf>,

		/// TOML settings [default: DIR/png_embedder.toml when present]
		#[clap(long)]
		config: Option<PathBuf>,

		#[clap(short, long)]
		verbose: bool,
	}
	let Args { dir, outDir, config, verbose } = Args::parse();
	initLogging(verbose);

	let config = match &config {
		Some(path) => Config::load(path),
		None => Config::discover(&dir),
	}?;
	debug!(?config);
	let outDir = outDir.unwrap_or_else(|| dir.clone());

	let stdout = &mut BufWriter::new(io::stdout().lock());
	let result = scan::run(&dir, &outDir, &config, stdout);
	stdout.flush()?;
	result.with_context(|| format!("embedding {}", dir.display()))?;
	Ok(())
}
