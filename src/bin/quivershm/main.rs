use anyhow::Result;
use env_logger::{Builder, Env};
use log::error;

mod cli;
mod util;
mod cmd_init;
mod cmd_put;
mod cmd_get;
mod cmd_take;
mod cmd_del;
mod cmd_clear;
mod cmd_batch;
mod cmd_status;
mod cmd_dump;
mod cmd_unlink;

fn init_logger() {
    // Уровень берём из RUST_LOG, иначе дефолт — info.
    // Пример: RUST_LOG=trace ./quivershm put --key a --value 1
    Builder::from_env(Env::default().default_filter_or("info"))
        .format_timestamp_millis()
        .init();
}

fn main() {
    init_logger();

    if let Err(e) = run() {
        // Логируем ошибку и выходим с кодом 1.
        error!("{:#}", e);
        std::process::exit(1);
    }
}

fn run() -> Result<()> {
    use clap::Parser;

    let cli = cli::Cli::parse();
    match cli.cmd {
        cli::Cmd::Init { seg, table_size, reuse } =>
            cmd_init::exec(seg.config(table_size), reuse),

        cli::Cmd::Put { seg, key, value } =>
            cmd_put::exec(seg.config(None), key, value),

        cli::Cmd::Get { seg, key, out, default } =>
            cmd_get::exec(seg.config(None), key, out, default),

        cli::Cmd::Take { seg, key } =>
            cmd_take::exec(seg.config(None), key),

        cli::Cmd::Del { seg, key } =>
            cmd_del::exec(seg.config(None), key),

        cli::Cmd::Clear { seg } =>
            cmd_clear::exec(seg.config(None)),

        cli::Cmd::Batch { seg, ops_file, ops_json } =>
            cmd_batch::exec(seg.config(None), ops_file, ops_json),

        // Status supports --json flag
        cli::Cmd::Status { seg, json } =>
            cmd_status::exec(seg.config(None), json),

        cli::Cmd::Dump { seg, entries } =>
            cmd_dump::exec(seg.config(None), entries),

        cli::Cmd::Unlink { seg } =>
            cmd_unlink::exec(seg.config(None)),
    }
}
