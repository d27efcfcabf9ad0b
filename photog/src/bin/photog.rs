#![deny(warnings)]

use {anyhow::Result, photog::Options, std::env, structopt::StructOpt};

#[tokio::main]
async fn main() -> Result<()> {
    if env::var_os("RUST_LOG").is_none() {
        env::set_var("RUST_LOG", "info");
    }

    pretty_env_logger::init_timed();

    photog::run(Options::from_args()).await?;

    println!("success!");

    Ok(())
}
