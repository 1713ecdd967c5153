// Copyright (c) The testwrap Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! A stand-in for a test binary, used by the integration tests.
//!
//! Usage: `fake-test-binary [-test.v] <scenario> [ARG]`
//!
//! Progress records are written to stdout the way `go test -json` writes them. As with real
//! test binaries, passing tests are only reported when the verbosity flag is passed.

use std::{env, io::Write, process::exit};

const PACKAGE: &str = "example.com/fake";

fn main() {
    let mut args = env::args().skip(1).peekable();
    let verbose = args.next_if_eq("-test.v").is_some();
    let scenario = args.next().unwrap_or_default();
    let arg = args.next();

    let code = match scenario.as_str() {
        "pass" => {
            passing_test(verbose, "TestOne");
            passing_test(verbose, "TestTwo");
            package_end("pass")
        }
        "fail" => {
            passing_test(verbose, "TestOne");
            record("run", "TestBroken", "");
            output("TestBroken", "broken_test.go:12: got 1, want 2\n");
            record("fail", "TestBroken", r#","Elapsed":0.02"#);
            package_end("fail")
        }
        "skip" => {
            record("run", "TestSkipped", "");
            output("TestSkipped", "skipping: needs network\n");
            record("skip", "TestSkipped", r#","Elapsed":0"#);
            package_end("pass")
        }
        "stderr" => {
            // The pauses let the supervisor observe each record before the next stderr write.
            record("run", "TestNoisy", "");
            pause();
            eprintln!("noisy diagnostics from TestNoisy");
            pause();
            record("pass", "TestNoisy", r#","Elapsed":0.2"#);
            pause();
            eprintln!("package teardown");
            package_end("pass")
        }
        "noisy" => {
            let len: usize = arg.as_deref().and_then(|s| s.parse().ok()).unwrap_or(4096);
            record("run", "TestNoisy", "");
            let line = "0123456789abcdef0123456789abcdef0123456789abcdef0123456789abcde\n";
            let mut written = 0;
            while written < len {
                output("TestNoisy", line);
                written += line.len();
            }
            record("pass", "TestNoisy", r#","Elapsed":0.1"#);
            package_end("pass")
        }
        "env" => {
            let value = env::var("TEST_WRAP").unwrap_or_else(|_| "<unset>".to_owned());
            eprintln!("TEST_WRAP={value}");
            eprintln!("args: verbose={verbose}");
            0
        }
        "exit" => arg.as_deref().and_then(|s| s.parse().ok()).unwrap_or(0),
        other => {
            eprintln!("[fake-test-binary] unknown scenario {other:?}");
            2
        }
    };

    let _ = std::io::stdout().flush();
    exit(code);
}

fn pause() {
    std::thread::sleep(std::time::Duration::from_millis(200));
}

fn passing_test(verbose: bool, test: &str) {
    if verbose {
        record("run", test, "");
        record("pass", test, r#","Elapsed":0.01"#);
    }
}

fn output(test: &str, text: &str) {
    let text = text.replace('\\', "\\\\").replace('"', "\\\"").replace('\n', "\\n");
    record("output", test, &format!(r#","Output":"{text}""#));
}

fn package_end(action: &str) -> i32 {
    println!(r#"{{"Action":"{action}","Package":"{PACKAGE}","Elapsed":0.5}}"#);
    if action == "pass" { 0 } else { 1 }
}

fn record(action: &str, test: &str, extra: &str) {
    println!(r#"{{"Action":"{action}","Package":"{PACKAGE}","Test":"{test}"{extra}}}"#);
}
