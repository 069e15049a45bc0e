use std::fs;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use env_logger::Env;
use serde::Serialize;
use serde_json::ser::PrettyFormatter;
use serde_json::Value;

use arkprofile_rs::document::{from_document, to_document};
use arkprofile_rs::verify::verify_bytes;
use arkprofile_rs::PlayerProfile;

#[derive(Parser)]
#[command(name = "arkprofile")]
#[command(about = "Codec for ASA PlayerLocalData.arkprofile files")]
#[command(version)]
struct Cli {
  #[command(subcommand)]
  command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
  /// Extract an .arkprofile into an editable JSON document
  Extract {
    /// Path to the .arkprofile file
    input: PathBuf,

    /// Output JSON path (default: <input>.json)
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// JSON indentation width
    #[arg(long, default_value_t = 2)]
    indent: usize,
  },

  /// Rebuild an .arkprofile from a JSON document
  Build {
    /// Path to the JSON file
    input: PathBuf,

    /// Output .arkprofile path
    #[arg(short, long)]
    output: Option<PathBuf>,
  },

  /// Check the structural consistency of one or more .arkprofile files
  Verify {
    /// .arkprofile file(s)
    #[arg(required = true)]
    input: Vec<PathBuf>,

    /// Print the property walk
    #[arg(short, long)]
    verbose: bool,
  },

  /// Launch the graphical editor (not included in this build)
  Gui,
}

fn main() -> ExitCode {
  env_logger::init_from_env(Env::default());

  let cli = Cli::parse();
  let code = match cli.command {
    Some(Commands::Extract { input, output, indent }) => cmd_extract(&input, output, indent),
    Some(Commands::Build { input, output }) => cmd_build(&input, output),
    Some(Commands::Verify { input, verbose }) => cmd_verify(&input, verbose),
    Some(Commands::Gui) | None => {
      eprintln!("The graphical editor is not part of this build; use extract, build or verify.");
      2
    }
  };
  ExitCode::from(code)
}

fn cmd_extract(input: &Path, output: Option<PathBuf>, indent: usize) -> u8 {
  let out_path = output.unwrap_or_else(|| default_extract_output(input));

  let profile = match PlayerProfile::load(input) {
    Ok(profile) => profile,
    Err(e) => {
      eprintln!("Error: failed to load {}: {e}", input.display());
      return 1;
    }
  };

  let doc = to_document(&profile);
  let json = match render_json(&doc, indent) {
    Ok(json) => json,
    Err(e) => {
      eprintln!("Error: failed to render JSON: {e}");
      return 1;
    }
  };
  if let Err(e) = fs::write(&out_path, json) {
    eprintln!("Error: failed to write {}: {e}", out_path.display());
    return 1;
  }

  println!("Extracted {} -> {}", input.display(), out_path.display());
  0
}

fn cmd_build(input: &Path, output: Option<PathBuf>) -> u8 {
  let out_path = output.unwrap_or_else(|| default_build_output(input));

  let text = match fs::read_to_string(input) {
    Ok(text) => text,
    Err(e) => {
      eprintln!("Error: failed to read {}: {e}", input.display());
      return 1;
    }
  };
  let doc: Value = match serde_json::from_str(&text) {
    Ok(doc) => doc,
    Err(e) => {
      eprintln!("Error: invalid JSON in {}: {e}", input.display());
      return 1;
    }
  };
  let mut profile = match from_document(&doc) {
    Ok(profile) => profile,
    Err(e) => {
      eprintln!("Error: {e}");
      return 1;
    }
  };
  if let Err(e) = profile.save(&out_path) {
    eprintln!("Error: failed to write {}: {e}", out_path.display());
    return 1;
  }

  println!("Built {} from {}", out_path.display(), input.display());
  0
}

fn cmd_verify(inputs: &[PathBuf], verbose: bool) -> u8 {
  let mut all_ok = true;
  for path in inputs {
    let data = match fs::read(path) {
      Ok(data) => data,
      Err(e) => {
        eprintln!("Error: failed to read {}: {e}", path.display());
        all_ok = false;
        continue;
      }
    };

    println!("File: {} ({} bytes)", path.display(), data.len());
    let report = verify_bytes(&data, verbose);
    if let Some(name) = &report.player_name {
      println!("  Name: {name}");
      println!("  Properties start at byte {}", report.prop_start);
    }
    for line in &report.trace {
      println!("  {line}");
    }
    println!("  Trailing bytes: {}", report.trailing_len);
    println!("  Properties checked: {}", report.props_checked);
    if report.is_ok() {
      println!("  All sizes OK");
    } else {
      all_ok = false;
      println!("  ERRORS: {}", report.diagnostics.len());
      for diagnostic in &report.diagnostics {
        println!("    {diagnostic}");
      }
    }
    println!();
  }
  if all_ok {
    0
  } else {
    1
  }
}

/// `extract` appends `.json` to the input name.
fn default_extract_output(input: &Path) -> PathBuf {
  let mut name = input.as_os_str().to_os_string();
  name.push(".json");
  PathBuf::from(name)
}

/// `build` strips a trailing `.json` from `*.arkprofile.json`, otherwise
/// replaces the extension with `.arkprofile`.
fn default_build_output(input: &Path) -> PathBuf {
  let text = input.to_string_lossy();
  match text.strip_suffix(".arkprofile.json") {
    Some(stem) => PathBuf::from(format!("{stem}.arkprofile")),
    None => input.with_extension("arkprofile"),
  }
}

fn render_json(doc: &Value, indent: usize) -> serde_json::Result<String> {
  let indent_bytes = vec![b' '; indent];
  let formatter = PrettyFormatter::with_indent(&indent_bytes);
  let mut out = Vec::new();
  let mut serializer = serde_json::Serializer::with_formatter(&mut out, formatter);
  doc.serialize(&mut serializer)?;
  Ok(String::from_utf8_lossy(&out).into_owned())
}
