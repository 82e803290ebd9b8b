use lispblocks::Interpreter;
use lispblocks::ast::Value;
use lispblocks::evaluator::Environment;
use rustyline::DefaultEditor;
use rustyline::error::ReadlineError;
use std::panic;
use std::process;
use tracing_subscriber::EnvFilter;

fn main() {
    // RUST_LOG=lispblocks=trace shows macro expansion, tail calls and blocks
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let result = panic::catch_unwind(|| {
        run_repl();
    });

    if let Err(panic_info) = result {
        eprintln!("The REPL encountered an unexpected error and must exit.");

        if let Some(msg) = panic_info.downcast_ref::<&str>() {
            eprintln!("Error: {msg}");
        } else if let Some(msg) = panic_info.downcast_ref::<String>() {
            eprintln!("Error: {msg}");
        } else {
            eprintln!("Error: Unknown panic occurred");
        }

        process::exit(1);
    }
}

fn run_repl() {
    println!("lispblocks interactive interpreter");
    println!("Enter programs like: (doseq (x (range 0 3)) (block x (* x x) 0))");
    println!("Type :help for more commands, or Ctrl+C to exit.");
    println!();

    let mut rl = match DefaultEditor::new() {
        Ok(rl) => rl,
        Err(err) => {
            eprintln!("Could not initialize REPL: {err}");
            return;
        }
    };
    let mut interpreter = Interpreter::new();
    let mut json_mode = false;

    loop {
        match rl.readline("lisp> ") {
            Ok(line) => {
                let line = line.trim();
                if line.is_empty() {
                    continue;
                }

                let _ = rl.add_history_entry(line);

                match line {
                    ":help" => {
                        print_help();
                        continue;
                    }
                    ":env" => {
                        print_environment(interpreter.root());
                        continue;
                    }
                    ":json" => {
                        json_mode = !json_mode;
                        if json_mode {
                            println!("JSON mode enabled: each run prints its full outcome as JSON");
                        } else {
                            println!("Text mode enabled: results and blocks printed as text");
                        }
                        continue;
                    }
                    ":quit" | ":exit" => {
                        println!("Goodbye!");
                        break;
                    }
                    _ => {}
                }

                let outcome = interpreter.interpret(line);

                if json_mode {
                    println!("{}", outcome.to_json());
                    continue;
                }

                for block in &outcome.blocks {
                    println!("  block {} {} {}", block.x, block.y, block.z);
                }
                match (outcome.result, outcome.error) {
                    (Some(result), _) => println!("{result}"),
                    (None, Some(error)) => println!("Error: {error}"),
                    (None, None) => {}
                }
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
}

fn print_help() {
    println!("lispblocks interpreter:");
    println!("  :help      - Show this help message");
    println!("  :env       - Show current environment bindings");
    println!("  :json      - Toggle JSON output of each run");
    println!("  :quit      - Exit the interpreter");
    println!("  :exit      - Exit the interpreter");
    println!("  Ctrl+C     - Exit the interpreter");
    println!();
    println!("Each line is one program; all of its forms run in order.");
    println!();
    println!("Special forms:");
    println!("  def let do if fn quote quasiquote quasiquoteexpand");
    println!("  defmacro! macroexpand block doseq");
    println!();
    println!("Examples:");
    println!("  (def sq (fn (x) (* x x))) (sq 7)");
    println!("  (defmacro! unless (fn (c a b) `(if ~c ~b ~a))) (unless false 1 2)");
    println!("  (def n (atom 0)) (swap! n inc) @n");
    println!("  (doseq (x (range 0 3)) (block x (sq x) \"sq\"))");
    println!();
}

fn print_environment(env: &Environment) {
    let bindings = env.get_all_bindings();

    if bindings.is_empty() {
        println!("Environment is empty.");
        return;
    }

    println!("Environment bindings ({} total):", bindings.len());
    println!();

    // Separate built-in functions from user-defined values
    let mut builtins = Vec::new();
    let mut user_defined = Vec::new();

    for (name, value) in bindings {
        match value {
            Value::BuiltinFunction(_) => builtins.push(name),
            _ => user_defined.push((name, value)),
        }
    }

    if !builtins.is_empty() {
        println!("Built-in functions ({}):", builtins.len());
        // Print in columns for readability
        let mut col = 0;
        for name in builtins {
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
        for (name, value) in user_defined {
            println!("  {name} = {value}");
        }
    }
}
