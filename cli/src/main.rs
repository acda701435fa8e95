mod config;
mod test_runner;

use std::path::{Path, PathBuf};
use std::process;

use clap::{ArgAction, Parser, Subcommand};
use codespan_reporting::files::SimpleFiles;
use codespan_reporting::term;
use codespan_reporting::term::termcolor::{ColorChoice, StandardStream};
use tracing::debug;
use tracing_subscriber::EnvFilter;

use assembler::{BlockSet, UniqueCounter};

use crate::config::Config;

const SUBCOMMANDS: &[&str] = &["script", "list", "test", "help"];

/// Options whose value is the following argument.
const VALUE_FLAGS: &[&str] = &["--config", "-o", "--output", "-c", "--category"];

#[derive(Parser)]
#[command(
    name = "mdx",
    version,
    about = "Assemble shell scripts from named markdown code blocks"
)]
struct Cli {
    /// Disable colored error output
    #[arg(long, global = true)]
    no_color: bool,

    /// Configuration file (default: ./mdx.toml if present)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Log resolution steps to stderr (-v debug, -vv trace)
    #[arg(short, long, global = true, action = ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Print the script for a block and everything it requires
    Script(ScriptArgs),

    /// List the blocks of a document
    List(ListArgs),

    /// Run .test.md fixture files
    Test(TestArgs),
}

#[derive(clap::Args)]
struct ScriptArgs {
    /// Markdown document
    file: String,

    /// Block to assemble (case-insensitive; default from config)
    block: Option<String>,

    /// Write the script to this file instead of stdout
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Omit the shebang line
    #[arg(long)]
    no_shebang: bool,
}

#[derive(clap::Args)]
struct ListArgs {
    /// Markdown document
    file: String,

    /// Include hidden blocks
    #[arg(long)]
    all: bool,
}

#[derive(clap::Args)]
struct TestArgs {
    /// Path to a .test.md file or directory containing them
    path: String,

    /// Run only tests in these categories (subfolder names). Repeatable.
    #[arg(short, long)]
    category: Vec<String>,

    /// List available categories and exit
    #[arg(long)]
    list_categories: bool,
}

fn main() {
    let args = with_default_subcommand(std::env::args().collect());

    let cli = Cli::parse_from(&args);
    init_tracing(cli.verbose);

    let config = match Config::load(cli.config.as_deref(), Path::new(".")) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("error: {}", e);
            process::exit(1);
        }
    };
    debug!(?config, "loaded configuration");

    match cli.command {
        Command::Script(script_args) => do_script(script_args, &config, cli.no_color),
        Command::List(list_args) => do_list(list_args, &config, cli.no_color),
        Command::Test(test_args) => {
            let path = Path::new(&test_args.path);
            if test_args.list_categories {
                test_runner::list_categories(path);
                return;
            }
            let exit_code = test_runner::run_tests(path, cli.no_color, &test_args.category);
            process::exit(exit_code);
        }
    }
}

/// `mdx doc.md` is shorthand for `mdx script doc.md`. The subcommand goes
/// first so that script options given before the file still parse; global
/// options are accepted after it.
fn with_default_subcommand(mut args: Vec<String>) -> Vec<String> {
    if let Some(pos) = first_positional(&args) {
        if !SUBCOMMANDS.contains(&args[pos].as_str()) {
            args.insert(1, "script".to_string());
        }
    }
    args
}

/// Index of the first argument that is neither a flag nor a flag's value.
fn first_positional(args: &[String]) -> Option<usize> {
    let mut i = 1;
    while i < args.len() {
        let arg = &args[i];
        if VALUE_FLAGS.contains(&arg.as_str()) {
            i += 2;
        } else if arg.starts_with('-') {
            i += 1;
        } else {
            return Some(i);
        }
    }
    None
}

fn init_tracing(verbose: u8) {
    let filter = match verbose {
        0 => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        1 => EnvFilter::new("debug"),
        _ => EnvFilter::new("trace"),
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

/// Read and parse a document, rendering parse errors and exiting on failure.
fn load_blocks(file: &str, config: &Config, no_color: bool) -> BlockSet {
    let source = match std::fs::read_to_string(file) {
        Ok(s) => s,
        Err(e) => {
            eprintln!("error: cannot read '{}': {}", file, e);
            process::exit(1);
        }
    };

    let mut files = SimpleFiles::new();
    let file_id = files.add(file.to_string(), source.clone());

    let parser = mdx::parser::Parser::new(source, file_id)
        .hide_literal_blocks(config.hide_literal_blocks);
    let document = match parser.parse() {
        Ok(d) => d,
        Err(errors) => {
            let color_choice = if no_color {
                ColorChoice::Never
            } else {
                ColorChoice::Auto
            };
            let writer = StandardStream::stderr(color_choice);
            let term_config = term::Config::default();
            for error in &errors {
                let diagnostic = error.to_diagnostic();
                let _ = term::emit_to_write_style(
                    &mut writer.lock(),
                    &term_config,
                    &files,
                    &diagnostic,
                );
            }
            process::exit(1);
        }
    };
    debug!(file, blocks = document.blocks.len(), "parsed document");

    match BlockSet::from_document(&document) {
        Ok(blocks) => blocks,
        Err(e) => {
            eprintln!("error: {}", e);
            process::exit(1);
        }
    }
}

fn do_script(args: ScriptArgs, config: &Config, no_color: bool) {
    let blocks = load_blocks(&args.file, config, no_color);

    let requested = args.block.as_deref().unwrap_or(&config.default_block);
    let Some(entry) = blocks.get_entry(requested) else {
        eprintln!("error: no block named `{}` in '{}'", requested, args.file);
        process::exit(1);
    };

    let counter = UniqueCounter::new();
    let lines = match assembler::collect_required_code(&blocks, &entry.name, &counter) {
        Ok(lines) => lines,
        Err(e) => {
            eprintln!("error: {}", e);
            process::exit(1);
        }
    };

    let mut text = String::new();
    if !args.no_shebang && !config.shebang.is_empty() {
        text.push_str(&config.shebang);
        text.push('\n');
    }
    for line in &lines {
        text.push_str(line);
        text.push('\n');
    }

    match &args.output {
        Some(path) => {
            if let Err(e) = std::fs::write(path, &text) {
                eprintln!("error: cannot write '{}': {}", path.display(), e);
                process::exit(1);
            }
            debug!(path = %path.display(), lines = lines.len(), "wrote script");
        }
        None => print!("{}", text),
    }
}

fn do_list(args: ListArgs, config: &Config, no_color: bool) {
    let blocks = load_blocks(&args.file, config, no_color);

    let shown: Vec<&mdx::block::Block> = if args.all {
        blocks.iter().collect()
    } else {
        blocks.visible().collect()
    };

    for block in shown {
        let mut line = block.name.clone();
        if block.title != block.name {
            line.push_str(&format!("  \"{}\"", block.title));
        }
        if let Some(stdout) = &block.stdout {
            line.push_str(&format!("  >{}", stdout));
        }
        if !block.headings.is_empty() {
            line.push_str(&format!("  [{}]", block.headings.join(" > ")));
        }
        if block.disabled {
            line.push_str("  (disabled)");
        }
        println!("{}", line);
    }
}
