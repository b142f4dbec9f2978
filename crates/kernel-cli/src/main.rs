use std::env;
use std::fs;

use contracts::ToolRequest;
use kernel_api::{replay_log, KernelApi};
use serde_json::json;

const SESSION_ID: &str = "cli";

fn print_usage() {
    println!("kernel-cli <command>");
    println!("commands:");
    println!("  generate <seed> <width> <height>");
    println!("  state <world-id>");
    println!("  preview <world-id> <script-file>");
    println!("  apply <world-id> <script-file>");
    println!("  replay");
    println!();
    println!("environment:");
    println!("  RPG_DATA_DIR  store path (default ./rpg.db)");
    println!("  RPG_ENV=test  in-memory store");
}

fn parse_i64(value: Option<&String>, label: &str) -> Result<i64, String> {
    let raw = value.ok_or_else(|| format!("missing {label}"))?;
    raw.parse::<i64>().map_err(|_| format!("invalid {label}: {raw}"))
}

fn read_script(path: Option<&String>) -> Result<String, String> {
    let path = path.ok_or_else(|| "missing script file".to_string())?;
    fs::read_to_string(path).map_err(|err| format!("cannot read {path}: {err}"))
}

fn open_api() -> Result<KernelApi, String> {
    KernelApi::from_env(SESSION_ID).map_err(|err| format!("cannot open store: {err}"))
}

fn run(api: &mut KernelApi, tool: &str, arguments: serde_json::Value) -> i32 {
    let response = api.dispatch(&ToolRequest::new(tool, arguments));
    for content in &response.content {
        println!("{}", content.text);
    }
    if response.is_error() {
        1
    } else {
        0
    }
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .init();

    let args: Vec<String> = env::args().collect();
    let command = args.get(1).map(String::as_str);

    let exit = match command {
        Some("generate") => match (
            args.get(2).cloned(),
            parse_i64(args.get(3), "width"),
            parse_i64(args.get(4), "height"),
        ) {
            (Some(seed), Ok(width), Ok(height)) => match open_api() {
                Ok(mut api) => run(
                    &mut api,
                    "world.generate",
                    json!({ "seed": seed, "width": width, "height": height }),
                ),
                Err(err) => {
                    eprintln!("error: {err}");
                    1
                }
            },
            (None, _, _) => {
                eprintln!("error: missing seed");
                print_usage();
                2
            }
            (_, Err(err), _) | (_, _, Err(err)) => {
                eprintln!("error: {err}");
                print_usage();
                2
            }
        },
        Some("state") => match args.get(2) {
            Some(world_id) => match open_api() {
                Ok(mut api) => run(&mut api, "world.getState", json!({ "world_id": world_id })),
                Err(err) => {
                    eprintln!("error: {err}");
                    1
                }
            },
            None => {
                eprintln!("error: missing world-id");
                print_usage();
                2
            }
        },
        Some(tool_name @ ("preview" | "apply")) => {
            let tool = if tool_name == "preview" {
                "world.mapPatch.preview"
            } else {
                "world.mapPatch.apply"
            };
            match (args.get(2), read_script(args.get(3))) {
                (Some(world_id), Ok(script)) => match open_api() {
                    Ok(mut api) => {
                        run(&mut api, tool, json!({ "world_id": world_id, "script": script }))
                    }
                    Err(err) => {
                        eprintln!("error: {err}");
                        1
                    }
                },
                (None, _) => {
                    eprintln!("error: missing world-id");
                    print_usage();
                    2
                }
                (_, Err(err)) => {
                    eprintln!("error: {err}");
                    print_usage();
                    2
                }
            }
        }
        Some("replay") => match open_api() {
            Ok(api) => match api.persisted_audit_log() {
                Ok(entries) => match KernelApi::in_memory(SESSION_ID) {
                    Ok(mut fresh) => {
                        let report = replay_log(&entries, &mut fresh);
                        println!(
                            "replayed={} skipped={} errors={} digest={:016x}",
                            report.replayed,
                            report.skipped.len(),
                            report.errors.len(),
                            report.digest,
                        );
                        0
                    }
                    Err(err) => {
                        eprintln!("error: {err}");
                        1
                    }
                },
                Err(err) => {
                    eprintln!("error: cannot load audit log: {err}");
                    1
                }
            },
            Err(err) => {
                eprintln!("error: {err}");
                1
            }
        },
        _ => {
            print_usage();
            2
        }
    };

    std::process::exit(exit);
}
