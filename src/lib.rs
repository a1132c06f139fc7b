#![warn(clippy::pedantic, elided_lifetimes_in_paths, explicit_outlives_requirements)]
#![allow(non_snake_case)]

use {
	const_format::concatcp,
	std::{io, path::PathBuf},
};

pub const EXTENSION: &str = "png";
pub const SYMBOL_SUFFIX: &str = concatcp!("_", EXTENSION);
pub const VALUES_PER_LINE: usize = 8;
pub const SKIP_MESSAGE: &str = "Skipped file (unsuitable filename): ";

#[derive(Debug, thiserror::Error)]
pub enum Error {
	#[error("{path:?}: {source}")]
	Read { path: PathBuf, source: io::Error },

	#[error("{path:?}: {source}")]
	Write { path: PathBuf, source: io::Error },

	#[error("{path:?}: {reason}")]
	Config { path: PathBuf, reason: String },

	#[error("{symbol}: {reason}")]
	Extract { symbol: String, reason: String },

	#[error("<stdout>: {0}")]
	Message(#[source] io::Error),
}

pub type Result<T, E = Error> = core::result::Result<T, E>;

/// Filename checks. Only the extension is matched case-insensitively.
pub mod name {
	use {
		super::{EXTENSION, SYMBOL_SUFFIX},
		regex::Regex,
		std::sync::OnceLock,
	};

	pub const PATTERN: &str = r"^([a-zA-Z._][a-zA-Z._0-9]*)[.][pP][nN][gG]$";

	fn pattern() -> &'static Regex {
		static PATTERN_REGEX: OnceLock<Regex> = OnceLock::new();
		PATTERN_REGEX.get_or_init(|| Regex::new(PATTERN).unwrap())
	}

	/// Whether the file takes part in a scan at all, i.e. ends in `.png` in any letter case.
	pub fn isCandidate(filename: &str) -> bool {
		let dotExtensionLen = EXTENSION.len() + 1;
		filename.len() >= dotExtensionLen
			&& filename.get(filename.len() - dotExtensionLen..).map_or(false, |suffix| {
				suffix.starts_with('.') && suffix[1..].eq_ignore_ascii_case(EXTENSION)
			})
	}

	/// The base name of a candidate whose name is usable as a C identifier, `None` otherwise.
	pub fn baseName(filename: &str) -> Option<&str> {
		pattern().captures(filename).and_then(|captures| captures.get(1)).map(|base| base.as_str())
	}

	pub fn symbolName(baseName: &str) -> String {
		[baseName, SYMBOL_SUFFIX].concat()
	}
}

/// Rendering of `pngfiles.h` / `pngfiles.cpp` text.
pub mod emit {
	use {super::VALUES_PER_LINE, core::fmt::Write};

	pub struct Asset<'a> {
		pub filename: &'a str,
		pub baseName: &'a str,
		pub bytes: &'a [u8],
	}

	impl Asset<'_> {
		pub fn symbol(&self) -> String {
			super::name::symbolName(self.baseName)
		}
	}

	/// The two generated artifacts of one run. Every asset pushed lands in both, in push order.
	pub struct Outputs {
		header: String,
		source: String,
		includeGuard: String,
	}

	impl Outputs {
		pub fn new(includeGuard: &str) -> Outputs {
			let mut header = String::new();
			writeln!(header, "#ifndef {includeGuard}\n#define {includeGuard}").unwrap();
			Outputs { header, source: String::new(), includeGuard: includeGuard.to_owned() }
		}

		pub fn push(&mut self, asset: &Asset<'_>) {
			let (symbol, count) = (asset.symbol(), asset.bytes.len());
			writeln!(self.header, "extern unsigned char {symbol}[{count}];").unwrap();
			writeln!(self.source, "/* {} - {count} bytes */\nunsigned char {symbol}[{count}] = {{", asset.filename)
				.unwrap();
			hexLines(&mut self.source, asset.bytes);
			self.source.push_str("};\n/* End Of File */\n");
		}

		/// Closes the include guard and hands back `(header, source)`.
		pub fn finish(self) -> (String, String) {
			let Outputs { mut header, source, includeGuard } = self;
			writeln!(header, "#endif //{includeGuard}").unwrap();
			(header, source)
		}
	}

	/*
		  0x01, 0x02, 0x03, 0x04, 0x05, 0x06, 0x07, 0x08,
		  0x09, 0x0a

		two spaces open every line, no separator after the last value,
		a short last line still gets its newline.
	*/
	pub fn hexLines(text: &mut String, bytes: &[u8]) {
		let count = bytes.len();
		for (i, byte) in bytes.iter().enumerate() {
			if i % VALUES_PER_LINE == 0 {
				text.push_str("  ");
			}
			write!(text, "0x{byte:02x}").unwrap();
			if (i + 1) < count {
				text.push_str(", ");
			}
			if i % VALUES_PER_LINE == VALUES_PER_LINE - 1 {
				text.push('\n');
			}
		}
		if count % VALUES_PER_LINE != 0 {
			text.push('\n');
		}
	}
}

pub mod config {
	use {
		super::{Error, Result},
		const_format::concatcp,
		serde::Deserialize,
		std::{ffi::OsStr, fs, io::ErrorKind, path::Path},
	};

	pub const DEFAULT_HEADER_FILE: &str = concatcp!(super::EXTENSION, "files.h");
	pub const DEFAULT_SOURCE_FILE: &str = concatcp!(super::EXTENSION, "files.cpp");
	pub const DEFAULT_INCLUDE_GUARD: &str = "__PNG_HEADER_FILE_H__";

	#[derive(Deserialize, Debug, PartialEq, Eq)]
	#[serde(default, deny_unknown_fields)]
	pub struct Config {
		pub headerFile: String,
		pub sourceFile: String,
		pub includeGuard: String,
	}

	impl Default for Config {
		fn default() -> Self {
			Config {
				headerFile: DEFAULT_HEADER_FILE.to_owned(),
				sourceFile: DEFAULT_SOURCE_FILE.to_owned(),
				includeGuard: DEFAULT_INCLUDE_GUARD.to_owned(),
			}
		}
	}

	impl Config {
		/// Looked up in the scanned directory when no `--config` is given.
		pub const FILENAME: &'static str = "png_embedder.toml";

		pub fn load(path: &Path) -> Result<Config> {
			let text = fs::read_to_string(path).map_err(|source| Error::Read { path: path.to_owned(), source })?;
			Config::parse(&text).map_err(|reason| Error::Config { path: path.to_owned(), reason })
		}

		pub fn discover(dir: &Path) -> Result<Config> {
			let path = dir.join(Config::FILENAME);
			match fs::metadata(&path) {
				Ok(_) => Config::load(&path),
				Err(err) if err.kind() == ErrorKind::NotFound => Ok(Config::default()),
				Err(source) => Err(Error::Read { path, source }),
			}
		}

		pub fn parse(text: &str) -> Result<Config, String> {
			let config: Config = toml::from_str(text).map_err(|err| err.to_string())?;
			config.validate()?;
			Ok(config)
		}

		fn validate(&self) -> Result<(), String> {
			let guard = self.includeGuard.as_bytes();
			if guard.is_empty()
				|| guard[0].is_ascii_digit()
				|| !guard.iter().all(|&byte| byte == b'_' || byte.is_ascii_alphanumeric())
			{
				return Err(format!("includeGuard {:?} is not a preprocessor identifier", self.includeGuard));
			}
			for (key, filename) in [("headerFile", &self.headerFile), ("sourceFile", &self.sourceFile)] {
				if filename.is_empty() || Path::new(filename).file_name() != Some(OsStr::new(filename)) {
					return Err(format!("{key} {filename:?} must be a plain file name"));
				}
			}
			if self.headerFile == self.sourceFile {
				return Err(format!("headerFile and sourceFile are both {:?}", self.headerFile));
			}
			Ok(())
		}
	}
}

pub mod scan {
	use {
		super::{
			config::Config,
			emit::{Asset, Outputs},
			name, Error, Result, SKIP_MESSAGE,
		},
		std::{
			collections::HashSet,
			fs,
			io::{self, Write},
			path::{Path, PathBuf},
		},
		tempfile::{Builder, NamedTempFile},
		tracing::{debug, info, warn},
	};

	#[derive(Debug, Default, PartialEq, Eq)]
	pub struct Report {
		/// `(symbol, byte count)` per embedded file, in output order.
		pub embedded: Vec<(String, usize)>,
		pub skipped: Vec<String>,
		/// Symbols emitted more than once, e.g. from `icon.png` next to `icon.PNG`.
		pub duplicates: Vec<String>,
	}

	/// Regular files of `dir` ending in `.png`, sorted by name.
	pub fn candidates(dir: &Path) -> Result<Vec<(String, PathBuf)>> {
		let readError = |source| Error::Read { path: dir.to_owned(), source };
		let mut candidates = Vec::new();
		for entry in fs::read_dir(dir).map_err(readError)? {
			let entry = entry.map_err(readError)?;
			let filename = entry.file_name().to_string_lossy().into_owned();
			if !name::isCandidate(&filename) {
				continue;
			}
			let path = entry.path();
			let metadata = fs::metadata(&path).map_err(|source| Error::Read { path: path.clone(), source })?;
			if metadata.is_file() {
				candidates.push((filename, path));
			} else {
				debug!(%filename, "not a regular file, ignored");
			}
		}
		candidates.sort_unstable();
		Ok(candidates)
	}

	/// Reads every candidate of `dir` into `outputs`, writing one skip line to `messages` per unusable name.
	pub fn scan(dir: &Path, outputs: &mut Outputs, messages: &mut impl Write) -> Result<Report> {
		let (mut report, mut symbols) = (Report::default(), HashSet::new());
		for (filename, path) in candidates(dir)? {
			let Some(baseName) = name::baseName(&filename) else {
				writeln!(messages, "{SKIP_MESSAGE}{filename}").map_err(Error::Message)?;
				report.skipped.push(filename);
				continue;
			};
			let bytes = fs::read(&path).map_err(|source| Error::Read { path, source })?;
			let asset = Asset { filename: &filename, baseName, bytes: &bytes };
			outputs.push(&asset);
			debug!(%filename, count = bytes.len(), "embedded");
			let symbol = asset.symbol();
			if !symbols.insert(symbol.clone()) {
				warn!(%filename, %symbol, "symbol emitted more than once, the generated C will not compile");
				report.duplicates.push(symbol.clone());
			}
			report.embedded.push((symbol, bytes.len()));
		}
		Ok(report)
	}

	/// Scans `dir` and replaces the configured header and source in `outDir`.
	/// Nothing is replaced unless every input was read and both outputs were written in full.
	pub fn run(dir: &Path, outDir: &Path, config: &Config, messages: &mut impl Write) -> Result<Report> {
		let mut outputs = Outputs::new(&config.includeGuard);
		let report = scan(dir, &mut outputs, messages)?;
		let (header, source) = outputs.finish();
		let header = Staged::new(outDir, &config.headerFile, header.as_bytes())?;
		let source = Staged::new(outDir, &config.sourceFile, source.as_bytes())?;
		source.commit()?;
		header.commit()?;
		info!(
			embedded = report.embedded.len(),
			skipped = report.skipped.len(),
			"wrote {} and {}",
			config.headerFile,
			config.sourceFile
		);
		Ok(report)
	}

	/// Write-then-rename, so readers of `outDir` never see a truncated file.
	pub fn persist(outDir: &Path, filename: &str, contents: &[u8]) -> Result<()> {
		Staged::new(outDir, filename, contents)?.commit()
	}

	/// Output written in full to a temp file next to its target, not yet renamed over it.
	/// Dropping it removes the temp file.
	pub struct Staged {
		file: NamedTempFile,
		path: PathBuf,
	}

	impl Staged {
		pub fn new(outDir: &Path, filename: &str, contents: &[u8]) -> Result<Staged> {
			let path = outDir.join(filename);
			let writeError = |source| Error::Write { path: path.clone(), source };
			let previous = match fs::metadata(&path) {
				Ok(metadata) if metadata.is_dir() => {
					return Err(writeError(io::Error::new(io::ErrorKind::Other, "is a directory")));
				}
				Ok(metadata) => Some(metadata.permissions()),
				Err(err) if err.kind() == io::ErrorKind::NotFound => None,
				Err(err) => return Err(writeError(err)),
			};
			let mut builder = Builder::new();
			// 0666 less the umask, as a plain create would give
			#[cfg(unix)]
			builder.permissions(std::os::unix::fs::PermissionsExt::from_mode(0o666));
			let mut file = builder.tempfile_in(outDir).map_err(writeError)?;
			file.write_all(contents).map_err(writeError)?;
			if let Some(permissions) = previous {
				file.as_file().set_permissions(permissions).map_err(writeError)?;
			}
			Ok(Staged { file, path })
		}

		pub fn commit(self) -> Result<()> {
			let Staged { file, path } = self;
			file.persist(&path).map_err(|err| Error::Write { path, source: err.error })?;
			Ok(())
		}
	}
}

/// Parses generated sources back into bytes.
pub mod extract {
	use {
		super::{Error, Result, EXTENSION, SYMBOL_SUFFIX},
		regex::Regex,
		std::sync::OnceLock,
	};

	#[derive(Debug, PartialEq, Eq)]
	pub struct Extracted {
		pub symbol: String,
		pub bytes: Vec<u8>,
	}

	impl Extracted {
		/// `icon_png` is written back as `icon.png`, anything else as `<symbol>.bin`.
		pub fn filename(&self) -> String {
			match self.symbol.strip_suffix(SYMBOL_SUFFIX) {
				Some(baseName) if !baseName.is_empty() => format!("{baseName}.{EXTENSION}"),
				_ => format!("{}.bin", self.symbol),
			}
		}
	}

	fn definitionHead() -> &'static Regex {
		static HEAD: OnceLock<Regex> = OnceLock::new();
		HEAD.get_or_init(|| {
			Regex::new(r"unsigned\s+char\s+([a-zA-Z._][a-zA-Z._0-9]*)\s*\[\s*([0-9]+)\s*\]\s*=\s*\{").unwrap()
		})
	}

	pub fn stripComments(text: &str) -> String {
		let (mut stripped, mut rest) = (String::with_capacity(text.len()), text);
		loop {
			let line = rest.find("//");
			let block = rest.find("/*").filter(|&b| line.map_or(true, |l| b < l));
			match (block, line) {
				(Some(b), _) => {
					stripped.push_str(&rest[..b]);
					stripped.push(' ');
					rest = rest[b + 2..].find("*/").map_or("", |end| &rest[b + 2 + end + 2..]);
				}
				(None, Some(l)) => {
					stripped.push_str(&rest[..l]);
					rest = rest[l..].find('\n').map_or("", |end| &rest[l + end..]);
				}
				(None, None) => {
					stripped.push_str(rest);
					return stripped;
				}
			}
		}
	}

	pub fn extract(text: &str) -> Result<Vec<Extracted>> {
		let text = stripComments(text);
		let mut extracted = Vec::new();
		for captures in definitionHead().captures_iter(&text) {
			let symbol = captures[1].to_owned();
			let error = |reason: String| Error::Extract { symbol: symbol.clone(), reason };
			let count: usize = captures[2].parse().map_err(|err| error(format!("array size: {err}")))?;
			let bodyStart = captures.get(0).map_or(0, |whole| whole.end());
			let body = match text[bodyStart..].find('}') {
				Some(end) => text[bodyStart..bodyStart + end].trim(),
				None => return Err(error("unterminated initializer".to_owned())),
			};
			let body = body.strip_suffix(',').unwrap_or(body);
			let mut bytes = Vec::with_capacity(count.min(body.len() / 4 + 1));
			if !body.is_empty() {
				for literal in body.split(',').map(str::trim) {
					bytes.push(parseHexLiteral(literal).ok_or_else(|| error(format!("bad literal {literal:?}")))?);
				}
			}
			if bytes.len() != count {
				return Err(error(format!("declared {count} bytes, found {}", bytes.len())));
			}
			extracted.push(Extracted { symbol, bytes });
		}
		Ok(extracted)
	}

	fn parseHexLiteral(literal: &str) -> Option<u8> {
		let digits = literal.strip_prefix("0x").or_else(|| literal.strip_prefix("0X"))?;
		if digits.is_empty() || !digits.bytes().all(|byte| byte.is_ascii_hexdigit()) {
			return None;
		}
		u8::from_str_radix(digits, 16).ok()
	}
}

/// `RUST_LOG` wins; otherwise warnings only, or this crate's debug output with `verbose`.
pub fn initLogging(verbose: bool) {
	use tracing_subscriber::EnvFilter;

	let filter = EnvFilter::try_from_default_env()
		.unwrap_or_else(|_| EnvFilter::new(if verbose { "png_embedder=debug,warn" } else { "warn" }));
	tracing_subscriber::fmt().with_env_filter(filter).with_writer(io::stderr).init();
}

#[cfg(test)]
mod tests {
	use super::{
		config::Config,
		emit::{hexLines, Asset, Outputs},
		extract::{extract, stripComments, Extracted},
		name::{baseName, isCandidate, symbolName},
		Error,
	};

	#[test]
	fn candidates_match_the_extension_in_any_case() {
		for filename in ["icon.png", "icon.PNG", "icon.pNg", "bad name.png", ".png"] {
			assert!(isCandidate(filename), "{filename}");
		}
		for filename in ["icon.jpg", "icon.png.bak", "png", "iconpng", "icon.pn"] {
			assert!(!isCandidate(filename), "{filename}");
		}
	}

	#[test]
	fn base_name_must_be_an_identifier() {
		assert_eq!(baseName("icon.png"), Some("icon"));
		assert_eq!(baseName("ICON.PNG"), Some("ICON"));
		assert_eq!(baseName("_a.b_9.png"), Some("_a.b_9"));
		assert_eq!(baseName(".hidden.png"), Some(".hidden"));
		for filename in ["bad name.png", "9lives.png", "dash-ed.png", ".png", "ümlaut.png", "a\u{fffd}.png"] {
			assert_eq!(baseName(filename), None, "{filename}");
		}
	}

	#[test]
	fn symbol_takes_the_lowercase_extension() {
		assert_eq!(symbolName("icon"), "icon_png");
		assert_eq!(symbolName(baseName("Logo.PNG").unwrap()), "Logo_png");
	}

	fn hex(bytes: &[u8]) -> String {
		let mut text = String::new();
		hexLines(&mut text, bytes);
		text
	}

	#[test]
	fn hex_lines_wrap_after_eight_values() {
		assert_eq!(hex(&[]), "");
		assert_eq!(hex(&[0, 1, 2, 3]), "  0x00, 0x01, 0x02, 0x03\n");
		assert_eq!(
			hex(&[0xff, 0xab, 2, 3, 4, 5, 6, 7]),
			"  0xff, 0xab, 0x02, 0x03, 0x04, 0x05, 0x06, 0x07\n"
		);
		assert_eq!(
			hex(&[0, 1, 2, 3, 4, 5, 6, 7, 8, 9]),
			"  0x00, 0x01, 0x02, 0x03, 0x04, 0x05, 0x06, 0x07, \n  0x08, 0x09\n"
		);
	}

	#[test]
	fn outputs_wrap_the_header_in_one_guard() {
		let mut outputs = Outputs::new("__PNG_HEADER_FILE_H__");
		outputs.push(&Asset { filename: "icon.png", baseName: "icon", bytes: &[0, 1, 2, 3] });
		outputs.push(&Asset { filename: "empty.PNG", baseName: "empty", bytes: &[] });
		let (header, source) = outputs.finish();
		assert_eq!(
			header,
			"#ifndef __PNG_HEADER_FILE_H__\n\
			 #define __PNG_HEADER_FILE_H__\n\
			 extern unsigned char icon_png[4];\n\
			 extern unsigned char empty_png[0];\n\
			 #endif //__PNG_HEADER_FILE_H__\n"
		);
		assert_eq!(
			source,
			"/* icon.png - 4 bytes */\n\
			 unsigned char icon_png[4] = {\n  0x00, 0x01, 0x02, 0x03\n};\n\
			 /* End Of File */\n\
			 /* empty.PNG - 0 bytes */\n\
			 unsigned char empty_png[0] = {\n};\n\
			 /* End Of File */\n"
		);
	}

	#[test]
	fn empty_run_still_has_a_guarded_header() {
		let (header, source) = Outputs::new("GUARD").finish();
		assert_eq!(header, "#ifndef GUARD\n#define GUARD\n#endif //GUARD\n");
		assert!(source.is_empty());
	}

	#[test]
	fn config_keys_are_optional() {
		assert_eq!(Config::parse("").unwrap(), Config::default());
		let config = Config::parse("headerFile = \"assets.h\"\n").unwrap();
		assert_eq!(config.headerFile, "assets.h");
		assert_eq!(config.sourceFile, "pngfiles.cpp");
		assert_eq!(config.includeGuard, "__PNG_HEADER_FILE_H__");
	}

	#[test]
	fn config_rejects_bad_values() {
		assert!(Config::parse("includeGuard = \"1ABC\"").is_err());
		assert!(Config::parse("includeGuard = \"A B\"").is_err());
		assert!(Config::parse("sourceFile = \"../out.cpp\"").is_err());
		assert!(Config::parse("sourceFile = \"pngfiles.h\"").is_err());
		assert!(Config::parse("unknownKey = 1").is_err());
	}

	#[test]
	fn comments_are_removed() {
		assert_eq!(stripComments("a /* b */ c // d\ne"), "a   c \ne");
		assert_eq!(stripComments("a /* unterminated"), "a  ");
		assert_eq!(stripComments("#endif //GUARD"), "#endif ");
		assert_eq!(stripComments("a /* only a block */ b"), "a   b");
		assert_eq!(stripComments("x // y /* z */\nw"), "x \nw");
		assert_eq!(stripComments("x /* y // z */ w"), "x   w");
	}

	#[test]
	fn extract_reads_generated_definitions() {
		let source = "/* icon.png - 4 bytes */\n\
			unsigned char icon_png[4] = {\n  0x00, 0x01, 0x0A, 0xff\n};\n\
			/* End Of File */\n\
			/* e.png - 0 bytes */\nunsigned char e_png[0] = {\n};\n";
		assert_eq!(
			extract(source).unwrap(),
			[
				Extracted { symbol: "icon_png".to_owned(), bytes: vec![0, 1, 10, 255] },
				Extracted { symbol: "e_png".to_owned(), bytes: vec![] },
			]
		);
	}

	#[test]
	fn extract_checks_declared_size_and_literals() {
		let mismatch = extract("unsigned char a_png[3] = { 0x01, 0x02 };");
		assert!(matches!(mismatch, Err(Error::Extract { ref symbol, .. }) if symbol == "a_png"));
		assert!(extract("unsigned char a_png[1] = { 0x100 };").is_err());
		assert!(extract("unsigned char a_png[1] = { 12 };").is_err());
		assert!(extract("unsigned char a_png[1] = { 0x01").is_err());
		assert_eq!(extract("unsigned char a_png[1] = { 0x01, };").unwrap()[0].bytes, [1]);
	}

	#[test]
	fn extract_does_not_trust_huge_declared_sizes() {
		let huge = format!("unsigned char a_png[{}] = {{ 0x01 }};", usize::MAX);
		assert!(matches!(extract(&huge), Err(Error::Extract { ref symbol, .. }) if symbol == "a_png"));
		let overflowing = "unsigned char a_png[99999999999999999999999] = { 0x01 };";
		assert!(matches!(extract(overflowing), Err(Error::Extract { .. })));
	}

	#[test]
	fn extracted_filenames() {
		let named = |symbol: &str| Extracted { symbol: symbol.to_owned(), bytes: vec![] }.filename();
		assert_eq!(named("icon_png"), "icon.png");
		assert_eq!(named("table"), "table.bin");
		assert_eq!(named("_png"), "_png.bin");
	}
}
