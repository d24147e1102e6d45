//! exile-decode - Decode poe.ninja ladder payloads and Path of Building builds
//!
//! Works on files already on disk: raw build-search responses saved from
//! poe.ninja, and PoB import codes or XML exports.

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use exile_decode_core::{
    decode_import_code, parse_pob_code, parse_pob_xml, Build, BuildSearchResult, DecoderConfig,
    Game, LadderExtractor,
};
use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info, trace, warn, Level};
use tracing_subscriber::EnvFilter;
use walkdir::WalkDir;

/// Explicit mods shown per item by `items`
const ITEM_MOD_PREVIEW: usize = 3;

/// Decode poe.ninja ladder payloads and Path of Building import codes
#[derive(Parser, Debug)]
#[command(name = "exile-decode")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Write output to this file instead of stdout
    #[arg(short, long, global = true)]
    output: Option<PathBuf>,

    /// Verbosity level (-v, -vv, -vvv)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Maximum nesting depth when probing protobuf payloads
    #[arg(long, global = true, default_value = "64")]
    max_depth: usize,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Extract (account, character) pairs from build-search payloads
    Ladder {
        /// A payload file, or a directory searched recursively
        path: PathBuf,
    },
    /// Print the XML inside a PoB import code
    Decode {
        /// File holding the import code
        file: PathBuf,
    },
    /// Parse a PoB build and print it as JSON
    Build {
        /// File holding an import code, or XML with --xml
        file: PathBuf,

        /// Input is raw XML rather than an import code
        #[arg(long)]
        xml: bool,

        /// Game the build belongs to
        #[arg(long, value_enum, default_value = "poe1")]
        game: GameArg,
    },
    /// List the equipped items of a PoB build
    Items {
        /// File holding an import code, or XML with --xml
        file: PathBuf,

        /// Input is raw XML rather than an import code
        #[arg(long)]
        xml: bool,

        /// Game the build belongs to
        #[arg(long, value_enum, default_value = "poe1")]
        game: GameArg,
    },
}

/// Game selector for the command line
#[derive(Debug, Clone, Copy, ValueEnum)]
enum GameArg {
    /// Path of Exile 1
    Poe1,
    /// Path of Exile 2
    Poe2,
}

impl From<GameArg> for Game {
    fn from(arg: GameArg) -> Self {
        match arg {
            GameArg::Poe1 => Game::Poe1,
            GameArg::Poe2 => Game::Poe2,
        }
    }
}

/// Summaries found in one payload file
#[derive(Debug, Serialize)]
struct LadderFile {
    path: PathBuf,
    summaries: BuildSearchResult,
}

#[derive(Debug, Default)]
struct LadderStats {
    files: usize,
    empty: usize,
    summaries: usize,
}

impl LadderStats {
    fn record(&mut self, result: &BuildSearchResult) {
        self.files += 1;
        self.summaries += result.len();
        if result.is_empty() {
            self.empty += 1;
        }
    }

    fn print_summary(&self) {
        info!(
            "Summary: {} files, {} summaries, {} files without summaries",
            self.files, self.summaries, self.empty
        );
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize tracing
    let level = match cli.verbose {
        0 => Level::WARN,
        1 => Level::INFO,
        2 => Level::DEBUG,
        _ => Level::TRACE,
    };

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive(level.into()))
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let output = cli.output.as_deref();
    match &cli.command {
        Command::Ladder { path } => {
            let config = DecoderConfig::new().max_depth(cli.max_depth);
            run_ladder(&LadderExtractor::with_config(config), path, output)
        }
        Command::Decode { file } => {
            let code = read_text(file)?;
            let xml = decode_import_code(&code)
                .with_context(|| format!("Failed to decode import code: {}", file.display()))?;
            match output {
                Some(path) => write_file(path, &xml),
                None => {
                    println!("{xml}");
                    Ok(())
                }
            }
        }
        Command::Build { file, xml, game } => {
            let build = load_build(file, *xml, (*game).into())?;
            emit_json(&build, output)
        }
        Command::Items { file, xml, game } => {
            let build = load_build(file, *xml, (*game).into())?;
            match output {
                Some(_) => emit_json(&build.items, output),
                None => {
                    print!("{}", format_items(&build));
                    Ok(())
                }
            }
        }
    }
}

fn run_ladder(extractor: &LadderExtractor, path: &Path, output: Option<&Path>) -> Result<()> {
    if !path.exists() {
        bail!("Input path does not exist: {}", path.display());
    }

    if path.is_file() {
        let summaries = decode_ladder_file(extractor, path)?;
        info!("Found {} summaries in {}", summaries.len(), path.display());
        return emit_json(&summaries, output);
    }

    let files = decode_ladder_directory(extractor, path)?;
    emit_json(&files, output)
}

/// Decode one saved build-search response
fn decode_ladder_file(extractor: &LadderExtractor, path: &Path) -> Result<BuildSearchResult> {
    trace!("Reading {}", path.display());
    let data = fs::read(path)
        .with_context(|| format!("Failed to read payload file: {}", path.display()))?;
    trace!("Read {} bytes from {}", data.len(), path.display());

    Ok(extractor.parse(&data))
}

/// Decode every non-hidden file below `directory`, in path order
fn decode_ladder_directory(
    extractor: &LadderExtractor,
    directory: &Path,
) -> Result<Vec<LadderFile>> {
    if !directory.is_dir() {
        bail!("Path is not a directory: {}", directory.display());
    }

    info!("Scanning directory: {}", directory.display());

    let mut stats = LadderStats::default();
    let mut files = Vec::new();

    for entry in WalkDir::new(directory)
        .follow_links(false)
        .sort_by_file_name()
        .into_iter()
        .filter_map(|e| e.ok())
    {
        let path = entry.path();

        if !path.is_file() {
            continue;
        }

        // Skip hidden files
        if path
            .file_name()
            .and_then(|n| n.to_str())
            .is_some_and(|n| n.starts_with('.'))
        {
            continue;
        }

        debug!("Processing payload: {}", path.display());
        match decode_ladder_file(extractor, path) {
            Ok(summaries) => {
                stats.record(&summaries);
                files.push(LadderFile {
                    path: path.to_path_buf(),
                    summaries,
                });
            }
            // Log error but continue with other files
            Err(e) => warn!("Error processing {}: {:#}", path.display(), e),
        }
    }

    stats.print_summary();
    Ok(files)
}

fn read_text(path: &Path) -> Result<String> {
    fs::read_to_string(path).with_context(|| format!("Failed to read input file: {}", path.display()))
}

/// Parse a build from an import-code file, or an XML file when `xml` is set
fn load_build(path: &Path, xml: bool, game: Game) -> Result<Build> {
    let text = read_text(path)?;
    let build = if xml {
        parse_pob_xml(&text, game)
    } else {
        parse_pob_code(&text, game)
    };
    build.with_context(|| format!("Failed to parse build: {}", path.display()))
}

/// One block per equipped slot: header, implicits, then a few explicits
fn format_items(build: &Build) -> String {
    let mut out = format!(
        "{} ({} {}, level {})\n",
        build.name,
        build.ascendancy.as_deref().unwrap_or(&build.character_class),
        build.game.display_name(),
        build.level
    );

    if build.items.is_empty() {
        out.push_str("  no equipped items\n");
        return out;
    }

    for (slot, item) in &build.items {
        out.push_str(&format!(
            "\n{slot}: {} [{}]\n",
            item.display_name().unwrap_or("?"),
            item.rarity.as_deref().unwrap_or("?")
        ));
        if let (Some(name), Some(base)) = (&item.name, &item.base_type) {
            if name != base {
                out.push_str(&format!("  base: {base}\n"));
            }
        }
        for m in &item.implicit_mods {
            out.push_str(&format!("  (implicit) {m}\n"));
        }
        for m in item.explicit_mods.iter().take(ITEM_MOD_PREVIEW) {
            out.push_str(&format!("  {m}\n"));
        }
        let hidden = item.explicit_mods.len().saturating_sub(ITEM_MOD_PREVIEW);
        if hidden > 0 {
            out.push_str(&format!("  ... {hidden} more\n"));
        }
    }

    out
}

fn emit_json<T: Serialize + ?Sized>(value: &T, output: Option<&Path>) -> Result<()> {
    let json = serde_json::to_string_pretty(value).context("Failed to serialize output")?;
    match output {
        Some(path) => {
            write_file(path, &json)?;
            info!("Wrote {}", path.display());
            Ok(())
        }
        None => {
            println!("{json}");
            Ok(())
        }
    }
}

/// Write a file, creating parent directories as needed
fn write_file(path: &Path, content: &str) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create directory: {}", parent.display()))?;
    }

    fs::write(path, content).with_context(|| format!("Failed to write file: {}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use base64::engine::general_purpose::STANDARD;
    use base64::Engine;
    use flate2::write::ZlibEncoder;
    use flate2::Compression;
    use std::io::Write;
    use tempfile::TempDir;

    const BUILD_XML: &str = r#"<PathOfBuilding>
    <Build className="Witch" ascendClassName="Occultist" level="94" buildName="ED Contagion"/>
    <Items activeItemSet="1">
        <Item id="1">Rarity: RARE
Grim Coil
Vaal Regalia
Implicits: 0
+110 to maximum Energy Shield
+40% to Cold Resistance
+35% to Lightning Resistance
+30% to Fire Resistance
</Item>
        <ItemSet id="1"><Slot name="Body Armour" itemId="1"/></ItemSet>
    </Items>
</PathOfBuilding>"#;

    fn len_field(field: u8, payload: &[u8], out: &mut Vec<u8>) {
        out.push((field << 3) | 2);
        out.push(payload.len() as u8);
        out.extend_from_slice(payload);
    }

    fn ladder_payload(accounts: &[&str], names: &[&str]) -> Vec<u8> {
        let column = |name: &str, rows: &[&str]| {
            let mut out = Vec::new();
            len_field(1, name.as_bytes(), &mut out);
            for row in rows {
                len_field(2, row.as_bytes(), &mut out);
            }
            out
        };

        let mut container = vec![0x08, 0x02];
        len_field(5, &column("account", accounts), &mut container);
        len_field(5, &column("name", names), &mut container);
        let mut out = Vec::new();
        len_field(1, &container, &mut out);
        out
    }

    fn import_code(xml: &str) -> String {
        let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(xml.as_bytes()).unwrap();
        STANDARD.encode(encoder.finish().unwrap())
    }

    #[test]
    fn test_decode_ladder_file() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("search.bin");
        fs::write(&path, ladder_payload(&["alice", "bob"], &["Ali", "Bobby"])).unwrap();

        let result = decode_ladder_file(&LadderExtractor::new(), &path).unwrap();
        let pairs: Vec<_> = result
            .iter()
            .map(|s| (s.account().to_string(), s.character().to_string()))
            .collect();
        assert_eq!(
            pairs,
            vec![
                ("alice".to_string(), "Ali".to_string()),
                ("bob".to_string(), "Bobby".to_string())
            ]
        );
    }

    #[test]
    fn test_decode_ladder_directory() {
        let temp_dir = TempDir::new().unwrap();
        let nested = temp_dir.path().join("leagues/settlers");
        fs::create_dir_all(&nested).unwrap();
        fs::write(nested.join("a.bin"), ladder_payload(&["x"], &["X"])).unwrap();
        fs::write(nested.join("b.bin"), b"garbage").unwrap();
        fs::write(nested.join(".hidden"), ladder_payload(&["h"], &["H"])).unwrap();

        let files = decode_ladder_directory(&LadderExtractor::new(), temp_dir.path()).unwrap();
        assert_eq!(files.len(), 2);
        assert!(files[0].path.ends_with("a.bin"));
        assert_eq!(files[0].summaries.len(), 1);
        assert!(files[1].summaries.is_empty());
    }

    #[test]
    fn test_load_build_from_code_and_xml() {
        let temp_dir = TempDir::new().unwrap();
        let code_path = temp_dir.path().join("build.txt");
        let xml_path = temp_dir.path().join("build.xml");
        fs::write(&code_path, import_code(BUILD_XML)).unwrap();
        fs::write(&xml_path, BUILD_XML).unwrap();

        let from_code = load_build(&code_path, false, Game::Poe1).unwrap();
        let from_xml = load_build(&xml_path, true, Game::Poe1).unwrap();
        assert_eq!(from_code.name, "ED Contagion");
        assert_eq!(from_code.items, from_xml.items);

        // XML read as an import code fails on the '<' characters
        let err = load_build(&xml_path, false, Game::Poe1).unwrap_err();
        assert!(format!("{err:#}").contains("invalid characters"));
    }

    #[test]
    fn test_format_items() {
        let build = parse_pob_xml(BUILD_XML, Game::Poe1).unwrap();
        let text = format_items(&build);

        assert!(text.starts_with("ED Contagion (Occultist Path of Exile 1, level 94)"));
        assert!(text.contains("Body Armour: Grim Coil [RARE]"));
        assert!(text.contains("  base: Vaal Regalia"));
        assert!(text.contains("+40% to Cold Resistance"));
        assert!(!text.contains("+30% to Fire Resistance"));
        assert!(text.contains("... 1 more"));
    }

    #[test]
    fn test_emit_json_creates_parent_dirs() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("out/nested/result.json");
        let build = parse_pob_xml(BUILD_XML, Game::Poe2).unwrap();

        emit_json(&build, Some(&path)).unwrap();

        let written: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(written["game"], "poe2");
        assert_eq!(written["level"], 94);
        assert_eq!(written["items"]["Body Armour"]["base_type"], "Vaal Regalia");
    }

    #[test]
    fn test_items_game_flag() {
        use clap::CommandFactory;

        let cli = Cli::parse_from(["exile-decode", "items", "build.txt", "--game", "poe2"]);
        let Command::Items { game, xml, .. } = cli.command else {
            panic!("expected items subcommand");
        };
        assert!(!xml);
        assert_eq!(Game::from(game), Game::Poe2);

        let cli = Cli::parse_from(["exile-decode", "items", "build.txt"]);
        assert!(matches!(cli.command, Command::Items { game: GameArg::Poe1, .. }));

        let help = Cli::command().render_help().to_string();
        assert!(help.contains("Write output to this file instead of stdout"));
    }

    #[test]
    fn test_format_items_poe2_header() {
        let build = parse_pob_xml(BUILD_XML, Game::Poe2).unwrap();
        assert!(format_items(&build).starts_with("ED Contagion (Occultist Path of Exile 2, level 94)"));
    }

    #[test]
    fn verify_cli() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
    }
}
