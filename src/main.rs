use clap::{Parser, Subcommand};
use std::collections::BTreeMap;
use std::fs;
use std::io::{self, IsTerminal, Read};
use std::path::{Path, PathBuf};
use std::time::Instant;
use walkdir::WalkDir;
use weft::render::{Env, Renderer, Value};
use weft::{compile_with, CallRegistry, HtmlPolicy, Options, ParseError};

#[derive(Parser)]
#[command(name = "weft")]
#[command(about = "Weft - HTML templates with components and live-update output")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Compile .weft files and print the compiled program
    Build {
        /// Path to a .weft file, or a directory to compile recursively
        #[arg(required_unless_present = "stdin")]
        file: Option<PathBuf>,

        /// Read template source from stdin
        #[arg(long)]
        stdin: bool,

        /// Output the compiled tree as JSON
        #[arg(long)]
        json: bool,

        /// Wrap output in debug annotation comments
        #[arg(long)]
        annotate: bool,
    },

    /// Compile and render a template to HTML
    Render {
        /// Path to a .weft file
        file: PathBuf,

        /// Assigns as a JSON object
        #[arg(long, default_value = "{}")]
        assigns: String,
    },

    /// Compile every .weft file under a directory and report errors
    Check {
        /// Directory to check
        dir: PathBuf,

        /// Print collected component calls as JSON
        #[arg(long)]
        calls: bool,
    },
}

fn main() {
    let cli = Cli::parse();

    match cli.command {
        Commands::Build { file, stdin, json, annotate } => {
            if stdin {
                build_stdin(json, annotate);
            } else if let Some(path) = file {
                build_path(&path, json, annotate);
            } else {
                eprintln!("Error: provide a file/directory or use --stdin");
                std::process::exit(1);
            }
        }
        Commands::Render { file, assigns } => render_file(&file, &assigns),
        Commands::Check { dir, calls } => check_directory(&dir, calls),
    }
}

fn build_stdin(json: bool, annotate: bool) {
    let mut source = String::new();
    io::stdin().read_to_string(&mut source).expect("Failed to read stdin");

    let options = Options { file: "<stdin>".to_string(), annotate };
    match weft::compile(&source, &options) {
        Ok(tree) => print_tree(&tree, json),
        Err(err) => {
            eprint!("{}", err.render(&source, "<stdin>"));
            std::process::exit(1);
        }
    }
}

fn build_path(path: &PathBuf, json: bool, annotate: bool) {
    if path.is_file() {
        if path.extension().is_none_or(|ext| ext != "weft") {
            eprintln!("Error: {} is not a .weft file", path.display());
            std::process::exit(1);
        }
        match build_file(path, annotate) {
            Ok(tree) => print_tree(&tree, json),
            Err((source, err)) => {
                eprint!("{}", err.render(&source, &path.display().to_string()));
                std::process::exit(1);
            }
        }
    } else if path.is_dir() {
        build_directory(path, annotate);
    } else {
        eprintln!("Error: {} does not exist", path.display());
        std::process::exit(1);
    }
}

fn build_directory(dir: &Path, annotate: bool) {
    let start = Instant::now();
    let mut file_count = 0;
    let mut failed = 0;

    for entry in WalkDir::new(dir)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.path().extension().is_some_and(|ext| ext == "weft"))
    {
        let path = entry.path();
        file_count += 1;
        match build_file(path, annotate) {
            Ok(_) => print_checked(&path.display().to_string()),
            Err((source, err)) => {
                failed += 1;
                eprint!("{}", err.render(&source, &path.display().to_string()));
            }
        }
    }

    if file_count == 0 {
        eprintln!("No .weft files found in {}", dir.display());
        std::process::exit(1);
    }
    print_summary(file_count, failed, start.elapsed());
    if failed > 0 {
        std::process::exit(1);
    }
}

fn build_file(path: &Path, annotate: bool) -> Result<weft::CompiledTree, (String, ParseError)> {
    let source = fs::read_to_string(path).expect("Failed to read file");
    let options = Options { file: path.display().to_string(), annotate };
    weft::compile(&source, &options).map_err(|err| (source, err))
}

fn render_file(path: &Path, assigns_json: &str) {
    let source = fs::read_to_string(path).expect("Failed to read file");
    let options = Options { file: path.display().to_string(), annotate: false };

    let tree = match weft::compile(&source, &options) {
        Ok(tree) => tree,
        Err(err) => {
            eprint!("{}", err.render(&source, &path.display().to_string()));
            std::process::exit(1);
        }
    };

    let json: serde_json::Value = match serde_json::from_str(assigns_json) {
        Ok(json) => json,
        Err(err) => {
            eprintln!("Error: --assigns is not valid JSON: {}", err);
            std::process::exit(1);
        }
    };
    let assigns = match json_env(&json) {
        Some(assigns) => assigns,
        None => {
            eprintln!("Error: --assigns must be a JSON object");
            std::process::exit(1);
        }
    };

    let renderer = Renderer::new(&assigns);
    match renderer.render(&tree) {
        Ok(rendered) => println!("{}", rendered.to_html()),
        Err(err) => {
            eprintln!("Render error: {}", err);
            std::process::exit(1);
        }
    }
}

fn check_directory(dir: &Path, print_calls: bool) {
    let start = Instant::now();
    let registry = CallRegistry::new();
    let policy = HtmlPolicy::new();
    let mut file_count = 0;
    let mut failed = 0;

    for entry in WalkDir::new(dir)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.path().extension().is_some_and(|ext| ext == "weft"))
    {
        let path = entry.path();
        file_count += 1;
        let source = fs::read_to_string(path).expect("Failed to read file");
        let options = Options { file: path.display().to_string(), annotate: false };
        match compile_with(&source, &options, &policy, Some(&registry)) {
            Ok(_) => print_checked(&path.display().to_string()),
            Err(err) => {
                failed += 1;
                eprint!("{}", err.render(&source, &path.display().to_string()));
            }
        }
    }

    registry.close();
    if file_count == 0 {
        eprintln!("No .weft files found in {}", dir.display());
        std::process::exit(1);
    }
    if print_calls {
        let calls = registry.calls();
        println!("{}", serde_json::to_string_pretty(&calls).expect("Failed to serialize calls"));
    }
    print_summary(file_count, failed, start.elapsed());
    if failed > 0 {
        std::process::exit(1);
    }
}

fn print_tree(tree: &weft::CompiledTree, json: bool) {
    if json {
        println!("{}", serde_json::to_string(tree).expect("Failed to serialize tree"));
    } else {
        println!("{:#?}", tree);
    }
}

/// Convert a JSON object into render assigns.
fn json_env(json: &serde_json::Value) -> Option<Env> {
    let object = json.as_object()?;
    let mut env = BTreeMap::new();
    for (key, value) in object {
        env.insert(key.clone(), json_value(value));
    }
    Some(env)
}

fn json_value(json: &serde_json::Value) -> Value {
    match json {
        serde_json::Value::Null => Value::Nil,
        serde_json::Value::Bool(b) => Value::Bool(*b),
        serde_json::Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                Value::Int(i)
            } else {
                Value::Float(n.as_f64().unwrap_or(0.0))
            }
        }
        serde_json::Value::String(s) => Value::Str(s.clone()),
        serde_json::Value::Array(items) => Value::List(items.iter().map(json_value).collect()),
        serde_json::Value::Object(map) => {
            Value::Map(map.iter().map(|(k, v)| (k.clone(), json_value(v))).collect())
        }
    }
}

fn print_checked(path: &str) {
    let is_tty = io::stderr().is_terminal();
    if is_tty {
        eprintln!("  \x1b[32m✓\x1b[0m {}", path);
    } else {
        eprintln!("  ✓ {}", path);
    }
}

fn print_summary(file_count: usize, failed: usize, elapsed: std::time::Duration) {
    if failed > 0 {
        eprintln!("{} of {} files failed in {:.2?}", failed, file_count, elapsed);
    } else {
        eprintln!("{} files ok in {:.2?}", file_count, elapsed);
    }
}
