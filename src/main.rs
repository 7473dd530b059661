use clap::{Arg, Command, value_parser};
use tracing_subscriber::EnvFilter;

use dispatch_planner::server;

fn cli() -> Command {
    Command::new("dispatch-planner")
        .about("Technician dispatch planning service")
        .arg(
            Arg::new("port")
                .long("port")
                .help("Port to serve the /solve endpoint on")
                .default_value("8080")
                .value_parser(value_parser!(u16)),
        )
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let matches = cli().get_matches();
    let port = *matches.get_one::<u16>("port").expect("defaulted");

    tracing::info!(port, "serving /solve");
    warp::serve(server::routes()).run(([0, 0, 0, 0], port)).await;
}
