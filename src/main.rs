use clap::Parser as ClapParser;
use jexl::{Context, Jexl, Value};
use std::io::{self, Read};

#[derive(ClapParser)]
#[command(name = "jexl")]
#[command(about = "Evaluate a Jexl expression against a JSON context")]
#[command(version)]
struct Cli {
    /// The expression to evaluate
    expression: String,

    /// JSON object providing the variable context (read from stdin when
    /// piped and not given here)
    #[arg(short, long)]
    context: Option<String>,

    /// Pretty-print the result
    #[arg(short, long)]
    pretty: bool,

    /// Print the parsed tree instead of evaluating
    #[arg(long)]
    ast: bool,
}

fn main() {
    let cli = Cli::parse();
    if let Err(e) = run(cli) {
        eprintln!("{}", e);
        std::process::exit(1);
    }
}

fn run(cli: Cli) -> Result<(), String> {
    let jexl = Jexl::new();

    if cli.ast {
        let compiled = jexl.compile(&cli.expression).map_err(|e| e.to_string())?;
        println!("{:#?}", compiled.ast());
        return Ok(());
    }

    let raw_context = match cli.context {
        Some(s) => Some(s),
        None if !atty::is(atty::Stream::Stdin) => {
            let mut buffer = String::new();
            io::stdin()
                .read_to_string(&mut buffer)
                .map_err(|e| e.to_string())?;
            if buffer.trim().is_empty() {
                None
            } else {
                Some(buffer)
            }
        }
        None => None,
    };

    let mut context = Context::new();
    if let Some(raw) = raw_context {
        let parsed: serde_json::Value = serde_json::from_str(&raw).map_err(|e| e.to_string())?;
        match Value::from(parsed) {
            Value::Object(map) => context.extend(map),
            _ => return Err("context must be a JSON object".to_string()),
        }
    }

    let result = jexl
        .evaluate(&cli.expression, &mut context)
        .map_err(|e| e.to_string())?;

    let json = serde_json::Value::from(result);
    let rendered = if cli.pretty {
        serde_json::to_string_pretty(&json)
    } else {
        serde_json::to_string(&json)
    }
    .map_err(|e| e.to_string())?;
    println!("{}", rendered);
    Ok(())
}
