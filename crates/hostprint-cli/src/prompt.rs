//! Terminal implementation of the operator prompt.

use std::io::{self, BufRead, Write};

use hostprint::discovery::DiscoveryQuery;
use hostprint::prompt::{OperatorPrompt, ReviewDecision};

/// Stdin-driven prompt for interactive runs. EOF (piped input running
/// dry, Ctrl-D) is treated as "stop here": skip remaining queries, abort
/// on error.
pub struct TerminalPrompt;

impl TerminalPrompt {
    fn read_line(prompt: &str) -> Option<String> {
        print!("{prompt}");
        let _ = io::stdout().flush();
        let mut line = String::new();
        match io::stdin().lock().read_line(&mut line) {
            Ok(0) | Err(_) => None,
            Ok(_) => Some(line.trim().to_string()),
        }
    }
}

impl OperatorPrompt for TerminalPrompt {
    fn review_query(&self, query: &DiscoveryQuery, index: usize, total: usize) -> ReviewDecision {
        println!("\n[Query {index}/{total}]");
        println!("  Type:   {}", query.query_type.wire_name());
        println!("  Source: {}", query.label());
        println!("  Value:  {}", query.value);

        loop {
            let Some(answer) =
                Self::read_line("\n  [A]pprove / [D]eny / [M]odify / [R]un all / [S]kip all: ")
            else {
                return ReviewDecision::SkipAll;
            };
            match answer.to_lowercase().as_str() {
                "a" => return ReviewDecision::Approve,
                "d" => return ReviewDecision::Deny,
                "m" => {
                    println!("  Current value: {}", query.value);
                    let Some(new_value) =
                        Self::read_line("  Enter new value (or press Enter to keep current): ")
                    else {
                        return ReviewDecision::SkipAll;
                    };
                    if new_value.is_empty() {
                        return ReviewDecision::Approve;
                    }
                    return ReviewDecision::Modify(new_value);
                }
                "r" => return ReviewDecision::RunAll,
                "s" => return ReviewDecision::SkipAll,
                _ => println!("  Invalid option. Please enter A, D, M, R, or S."),
            }
        }
    }

    fn continue_after_error(&self, error: &str) -> bool {
        println!("\n[!] Query error: {error}");
        match Self::read_line("[?] Continue with remaining queries? [y/N]: ") {
            Some(answer) => matches!(answer.to_lowercase().as_str(), "y" | "yes"),
            None => false,
        }
    }
}
