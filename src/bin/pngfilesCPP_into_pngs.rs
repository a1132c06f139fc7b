#![warn(clippy::pedantic, elided_lifetimes_in_paths, explicit_outlives_requirements)]
#![allow(non_snake_case)]

use {
	anyhow::Context,
	clap::Parser,
	png_embedder::{extract::extract, initLogging, scan::persist},
	std::{
		fs,
		io::{self, BufWriter, Write},
		path::PathBuf,
	},
};

fn main() -> anyhow::Result<()> {
	/// Writes every array of a generated source back out as a file.
	#[derive(Parser)]
	struct Args {
		#[clap(default_value = "pngfiles.cpp")]
		source: PathBuf,

		#[clap(long, default_value = ".")]
		outDir: PathBuf,

		#[clap(short, long)]
		verbose: bool,
	}
	let Args { source, outDir, verbose } = Args::parse();
	initLogging(verbose);

	let text = fs::read_to_string(&source).with_context(|| format!("{source:?}"))?;
	let stdout = &mut BufWriter::new(io::stdout().lock());
	for extracted in extract(&text).with_context(|| format!("{source:?}"))? {
		let filename = extracted.filename();
		persist(&outDir, &filename, &extracted.bytes)?;
		writeln!(stdout, "{filename}\t{}", extracted.bytes.len())?;
	}
	stdout.flush()?;
	Ok(())
}
