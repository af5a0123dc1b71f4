use clap::{Arg, ArgAction, ArgMatches, Command};
use lispy::ast::Value;
use lispy::{Config, Error, InputPort, Interpreter, SymbolTable};
use rustyline::DefaultEditor;
use rustyline::error::ReadlineError;
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

const PROMPT: &str = "lispy> ";
const CONTINUATION_PROMPT: &str = "  ...> ";

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let matches = cli().get_matches();

    let config = Config {
        load_prelude: !matches.get_flag("no-prelude"),
        ..Config::default()
    };
    let mut interp = match Interpreter::with_config(config) {
        Ok(interp) => interp,
        Err(e) => {
            eprintln!("Error: {e}");
            return ExitCode::FAILURE;
        }
    };

    if let Err(e) = run_batch(&mut interp, &matches) {
        eprintln!("Error: {e}");
        return ExitCode::FAILURE;
    }

    let batch_given = matches.contains_id("files") || matches.contains_id("eval");
    if !batch_given || matches.get_flag("interactive") {
        run_repl(&mut interp)
    } else {
        ExitCode::SUCCESS
    }
}

fn cli() -> Command {
    Command::new("lispy")
        .version(env!("CARGO_PKG_VERSION"))
        .about("Scheme-family interpreter with macros, tail calls and escape continuations")
        .arg(
            Arg::new("files")
                .value_name("FILE")
                .num_args(1..)
                .action(ArgAction::Append)
                .help("Script files to load, in order"),
        )
        .arg(
            Arg::new("eval")
                .short('e')
                .long("eval")
                .value_name("EXPR")
                .action(ArgAction::Append)
                .help("Evaluate an expression and print its value"),
        )
        .arg(
            Arg::new("interactive")
                .short('i')
                .long("interactive")
                .action(ArgAction::SetTrue)
                .help("Start the REPL after loading files and expressions"),
        )
        .arg(
            Arg::new("no-prelude")
                .long("no-prelude")
                .action(ArgAction::SetTrue)
                .help("Skip the and/or/when/unless prelude"),
        )
}

/// Load every script, then evaluate every `-e` expression; stops at the first error
fn run_batch(interp: &mut Interpreter, matches: &ArgMatches) -> Result<(), Error> {
    for file in matches.get_many::<String>("files").into_iter().flatten() {
        interp.load(file)?;
    }
    for expr in matches.get_many::<String>("eval").into_iter().flatten() {
        let value = interp.eval_str(expr)?;
        if !matches!(value, Value::Unspecified) {
            println!("{}", interp.to_string(&value));
        }
    }
    Ok(())
}

fn run_repl(interp: &mut Interpreter) -> ExitCode {
    println!("Lispy Scheme interpreter");
    println!("Enter S-expressions like: (+ 1 2)");
    println!("Type :help for more commands, or Ctrl+D to exit.");
    println!();

    let mut rl = match DefaultEditor::new() {
        Ok(rl) => rl,
        Err(e) => {
            eprintln!("Could not initialize REPL: {e}");
            return ExitCode::FAILURE;
        }
    };

    let mut buffer = String::new();

    loop {
        let prompt = if buffer.is_empty() {
            PROMPT
        } else {
            CONTINUATION_PROMPT
        };

        match rl.readline(prompt) {
            Ok(line) => {
                if buffer.is_empty() {
                    match line.trim() {
                        "" => continue,
                        ":help" => {
                            print_help();
                            continue;
                        }
                        ":env" => {
                            print_environment(interp);
                            continue;
                        }
                        ":quit" | ":exit" => {
                            println!("Goodbye!");
                            break;
                        }
                        _ => {}
                    }
                }

                buffer.push_str(&line);
                buffer.push('\n');

                // Keep reading while the input ends inside an open list
                if let Err(e) = lispy::reader::read_all(&buffer, &mut SymbolTable::new())
                    && e.is_incomplete()
                {
                    continue;
                }

                let _ = rl.add_history_entry(buffer.trim_end());
                evaluate_input(interp, &buffer);
                buffer.clear();
            }
            Err(ReadlineError::Interrupted) if !buffer.is_empty() => {
                // Ctrl+C abandons a partial entry
                buffer.clear();
            }
            Err(ReadlineError::Eof | ReadlineError::Interrupted) => {
                println!("Goodbye!");
                break;
            }
            Err(err) => {
                println!("Error: {err:?}");
                break;
            }
        }
    }

    ExitCode::SUCCESS
}

/// Evaluate each datum of one REPL entry, printing results; an error abandons the
/// rest of the entry but leaves the session intact
fn evaluate_input(interp: &mut Interpreter, text: &str) {
    let mut port = InputPort::from_source(text);
    loop {
        let result = match interp.parse(&mut port) {
            Ok(Some(x)) => interp.eval(&x),
            Ok(None) => break,
            Err(e) => Err(e),
        };
        match result {
            // Don't print Unspecified values (e.g., from define)
            Ok(Value::Unspecified) => {}
            Ok(value) => println!("{}", interp.to_string(&value)),
            Err(e) => {
                println!("Error: {e}");
                break;
            }
        }
    }
}

fn print_help() {
    println!("Lispy Scheme interpreter:");
    println!("  :help      - Show this help message");
    println!("  :env       - Show global bindings");
    println!("  :quit      - Exit the interpreter");
    println!("  :exit      - Exit the interpreter");
    println!("  Ctrl+D     - Exit the interpreter");
    println!();
    println!("Special forms:");
    println!("  quote if set! define lambda begin define-macro quasiquote");
    println!("  let cond and or when unless (macros)");
    println!();
    println!("Examples:");
    println!("  (define (fact n) (if (< n 2) 1 (* n (fact (- n 1)))))");
    println!("  (let ((x 1) (y 2)) (+ x y))");
    println!("  `(1 ,(+ 1 1) ,@(list 3 4))");
    println!("  (call/cc (lambda (k) (+ 1 (k 42))))");
    println!();
}

fn print_environment(interp: &Interpreter) {
    let bindings = interp.global_bindings();

    if bindings.is_empty() {
        println!("Environment is empty.");
        return;
    }

    println!("Global bindings ({} total):", bindings.len());
    println!();

    // Separate primitives from user-defined values
    let (builtins, user_defined): (Vec<_>, Vec<_>) = bindings
        .into_iter()
        .partition(|(_, value)| matches!(value, Value::Native(_)));

    if !builtins.is_empty() {
        println!("Primitives ({}):", builtins.len());
        let mut col = 0;
        for (name, _) in &builtins {
            print!("  {name:<15}");
            col += 1;
            if col % 4 == 0 {
                println!();
            }
        }
        if col % 4 != 0 {
            println!();
        }
        println!();
    }

    if !user_defined.is_empty() {
        println!("User-defined values ({}):", user_defined.len());
        for (name, value) in &user_defined {
            println!("  {name} = {}", interp.to_string(value));
        }
    }
}
