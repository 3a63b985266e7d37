use rustyline::DefaultEditor;
use rustyline::error::ReadlineError;
use stacklisp::Interpreter;
use stacklisp::lexer::lex;
use std::panic;
use std::process;
use tracing_subscriber::EnvFilter;

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    // evaluation never panics on user input; anything caught here is a bug
    if let Err(payload) = panic::catch_unwind(run_repl) {
        let reason = payload
            .downcast_ref::<&str>()
            .map(|s| (*s).to_owned())
            .or_else(|| payload.downcast_ref::<String>().cloned())
            .unwrap_or_else(|| "non-string panic payload".to_owned());
        eprintln!("stacklisp: interpreter bug, REPL aborted: {reason}");
        process::exit(1);
    }
}

/// Open brackets minus close brackets, or `None` if the text does not lex yet
fn open_depth(text: &str) -> Option<isize> {
    let tokens = lex(text).ok()?;
    Some(tokens.iter().fold(0, |depth, token| match token.text.as_str() {
        "(" | "[" => depth + 1,
        ")" | "]" => depth - 1,
        _ => depth,
    }))
}

fn run_repl() {
    println!("StackLisp explicit-stack interpreter");
    println!("Enter expressions like: ((lambda (n) (+ n 1)) 5)");
    println!("Type :help for more commands, or Ctrl+D to exit.");
    println!();

    let mut rl = match DefaultEditor::new() {
        Ok(rl) => rl,
        Err(err) => {
            eprintln!("Could not initialize REPL: {err}");
            return;
        }
    };
    let mut interpreter = Interpreter::new().with_source_name("repl");
    let mut pending = String::new();

    loop {
        let prompt = if pending.is_empty() { "stacklisp> " } else { "       ... " };
        match rl.readline(prompt) {
            Ok(line) => {
                if pending.is_empty() {
                    match line.trim() {
                        "" => continue,
                        ":help" => {
                            print_help();
                            continue;
                        }
                        ":quit" => break,
                        _ => {}
                    }
                }

                pending.push_str(&line);
                pending.push('\n');

                // keep reading while brackets are still open
                if open_depth(&pending).is_some_and(|depth| depth > 0) {
                    continue;
                }

                let _ = rl.add_history_entry(pending.trim_end());
                let source = std::mem::take(&mut pending);

                match interpreter.evaluate_each(&source) {
                    Ok(results) => {
                        for result in results {
                            match result {
                                Ok(value) => println!("{value}"),
                                Err(e) => println!("{e}"),
                            }
                        }
                    }
                    Err(e) => println!("{e}"),
                }
            }
            Err(ReadlineError::Interrupted) => {
                if pending.is_empty() {
                    println!("^C");
                } else {
                    pending.clear();
                }
            }
            Err(ReadlineError::Eof) => break,
            Err(err) => {
                eprintln!("Error: {err}");
                break;
            }
        }
    }

    println!("Goodbye!");
}

fn print_help() {
    println!("Commands:");
    println!("  :help   show this message");
    println!("  :quit   leave the REPL");
    println!();
    println!("Syntax:");
    println!("  (op arg ...)            call an operator or lambda");
    println!("  [a b c]                 literal list");
    println!("  (lambda (x y) body ...) closure; #lambda and #args inside the body");
    println!("  (if test then [else])   test must be #t or #f");
    println!("  ; comment               to end of line");
    println!();
    println!("Operators: + - * / % < > eq not and or car cdr cons length begin type display");
    println!("Constants: #t #f #nil :number :string :char :bool :list :lambda :nil :type");
    println!("Set RUST_LOG=stacklisp=trace to watch the control stack.");
}
