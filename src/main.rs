use anyhow::Context;
use clap::Parser;
use std::process::ExitCode;
use tracing_subscriber::{ layer::SubscriberExt, util::SubscriberInitExt, EnvFilter };
use webhook_bench::{
    compare::compare_files,
    config::{ Cli, Command, CompareArgs, RunConfig },
    dispatcher::HttpDispatcher,
    runner::{ self, BatchRunner },
    store::ResultStore,
};

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    if let Err(err) = real_main(cli) {
        eprintln!("Error: {err:#}");
        return ExitCode::from(1);
    }
    ExitCode::SUCCESS
}

fn init_tracing(verbose: bool) {
    let default_level = if verbose { "webhook_bench=debug" } else { "webhook_bench=info" };
    tracing_subscriber
        ::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| default_level.into()))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

fn real_main(cli: Cli) -> anyhow::Result<()> {
    match cli.cmd {
        Command::Run(args) => run(RunConfig::try_from(args)?),
        Command::Compare(args) => compare(args),
    }
}

fn run(config: RunConfig) -> anyhow::Result<()> {
    ctrlc
        ::set_handler(|| {
            eprintln!("\nTest interrupted by user");
            std::process::exit(1);
        })
        .context("failed to set Ctrl+C handler")?;

    if config.preflight {
        runner::preflight(&config.url, config.connection_timeout)?;
    }

    let dispatcher = HttpDispatcher::new(config.timeout, config.connection_timeout)?;
    let mut store = ResultStore::new(&config.results_dir);
    if let Some(name) = &config.out {
        store = store.with_file_name(name);
    }
    let runner = BatchRunner::new(dispatcher)
        .with_store(store)
        .with_pause(config.pause)
        .with_console(!config.summarize);

    println!("Sending batches of {:?} request(s) to {}", config.levels, runner::redact_url(&config.url));
    println!("using {} thread(s)\nPlease be patient..", config.threads);

    let runtime = runner::runtime(config.threads)?;
    let output = runtime.block_on(runner.run(&config.url, &config.payload, &config.levels))?;

    output.snapshot.print_report(config.summarize);
    match output.saved {
        Some(Ok(path)) => println!("\nResults saved to: {}", path.display()),
        Some(Err(err)) => eprintln!("\nWarning: {err}"),
        None => {}
    }
    Ok(())
}

fn compare(args: CompareArgs) -> anyhow::Result<()> {
    let store = ResultStore::new(&args.results_dir);
    let report = compare_files(&store, &args.baseline, &args.candidate)?;
    print!("{report}");
    Ok(())
}
