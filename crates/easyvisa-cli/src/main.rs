use anyhow::Result;
use clap::{Arg, ArgAction, ArgMatches, Command, ValueHint};
use log::LevelFilter;
use std::path::PathBuf;

use easyvisa_cli::explore::run_explore;
use easyvisa_cli::input::{load_train_config, TrainConfig};
use easyvisa_cli::train::run_training;

fn main() -> Result<()> {
    env_logger::Builder::default()
        .filter_level(LevelFilter::Error)
        .parse_env(env_logger::Env::default().filter_or("EASYVISA_LOG", "error,easyvisa=info"))
        .init();

    let matches = Command::new("easyvisa")
        .version(clap::crate_version!())
        .about("EasyVisa CLI - exploratory analysis and classifier comparison for visa applications")
        .subcommand_required(true)
        .arg_required_else_help(true)
        .subcommand(
            Command::new("explore")
                .about("Summarize an EasyVisa CSV and write an exploratory HTML report")
                .arg(
                    Arg::new("data")
                        .help("Path to the EasyVisa CSV file")
                        .required(true)
                        .value_parser(clap::builder::NonEmptyStringValueParser::new())
                        .value_hint(ValueHint::FilePath),
                )
                .arg(
                    Arg::new("output_file")
                        .short('o')
                        .long("output")
                        .help("Path of the HTML report. Defaults to easyvisa_eda.html.")
                        .value_parser(clap::value_parser!(PathBuf))
                        .value_hint(ValueHint::FilePath),
                ),
        )
        .subcommand(
            Command::new("train")
                .about("Preprocess the data, train every configured model and compare them")
                .arg(
                    Arg::new("config")
                        .help("Path to the training JSON configuration file")
                        .required(false)
                        .value_parser(clap::value_parser!(PathBuf))
                        .value_hint(ValueHint::FilePath),
                )
                .arg(
                    Arg::new("data")
                        .short('d')
                        .long("data")
                        .value_parser(clap::builder::NonEmptyStringValueParser::new())
                        .help(
                            "Path to the EasyVisa CSV. Overrides the data_path specified \
                             in the configuration file.",
                        )
                        .value_hint(ValueHint::FilePath),
                )
                .arg(
                    Arg::new("output_dir")
                        .short('o')
                        .long("output_dir")
                        .value_parser(clap::builder::NonEmptyStringValueParser::new())
                        .help(
                            "Directory for the comparison table and report. Overrides the \
                             output_dir specified in the configuration file.",
                        )
                        .value_hint(ValueHint::DirPath),
                )
                .arg(
                    Arg::new("no_report")
                        .long("no-report")
                        .help("Disable HTML report generation.")
                        .action(ArgAction::SetTrue),
                ),
        )
        .help_template(
            "{usage-heading} {usage}\n\n\
             {about-with-newline}\n\
             Version {version}\n\n\
             {all-args}{after-help}",
        )
        .get_matches();

    match matches.subcommand() {
        Some(("explore", sub_m)) => handle_explore(sub_m),
        Some(("train", sub_m)) => handle_train(sub_m),
        _ => unreachable!("Subcommand is required by CLI configuration"),
    }
}

fn handle_explore(matches: &ArgMatches) -> Result<()> {
    let data_path: &String = matches
        .get_one("data")
        .ok_or_else(|| anyhow::anyhow!("missing data path"))?;
    let report_path = matches
        .get_one::<PathBuf>("output_file")
        .cloned()
        .unwrap_or_else(|| PathBuf::from("easyvisa_eda.html"));
    log::info!("[EasyVisa::Explore] Exploring {}", data_path);

    match run_explore(data_path, &report_path) {
        Ok(_) => Ok(()),
        Err(e) => {
            log::error!("Exploration failed: {:#}", e);
            std::process::exit(1)
        }
    }
}

fn handle_train(matches: &ArgMatches) -> Result<()> {
    let config = match matches.get_one::<PathBuf>("config") {
        Some(config_path) => {
            log::info!("[EasyVisa::Train] Training from config: {:?}", config_path);
            match load_train_config(config_path) {
                Ok(config) => config,
                Err(e) => {
                    log::error!("Loading configuration failed: {:#}", e);
                    std::process::exit(1)
                }
            }
        }
        None => {
            eprintln!("[EasyVisa::Train] No config file provided; using defaults.");
            TrainConfig::default()
        }
    };

    let config = config.with_overrides(
        matches.get_one::<String>("data").map(String::as_str),
        matches.get_one::<String>("output_dir").map(String::as_str),
        matches.get_flag("no_report"),
    );

    if matches.get_one::<PathBuf>("config").is_none() {
        let default_json = serde_json::to_string_pretty(&config).unwrap_or_default();
        println!("{}", default_json);
    }

    match run_training(&config) {
        Ok(_) => Ok(()),
        Err(e) => {
            log::error!("Training failed: {:#}", e);
            std::process::exit(1)
        }
    }
}
