use radar_mcp::server::RadarServer;
use rmcp::ServiceExt;

fn print_version() {
    println!("{}", env!("CARGO_PKG_VERSION"));
}

fn print_help() {
    println!(
        "radar-mcp — mass-assignment scanner served as MCP tools over stdio\n\n\
         Usage:\n  radar-mcp              start the MCP server (stdio)\n  \
         radar-mcp version      print the version\n  radar-mcp help         this text\n\n\
         Env:\n  RADAR_STATE_DIR=<path>   request/findings store (default .radar/state)"
    );
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args: Vec<String> = std::env::args().collect();
    match args.get(1).map(String::as_str) {
        Some("version") | Some("--version") | Some("-V") => {
            print_version();
            return Ok(());
        }
        Some("help") | Some("--help") | Some("-h") => {
            print_help();
            return Ok(());
        }
        Some(other)
            if matches!(other, "--stdio" | "stdio" | "--mcp" | "mcp") || other.starts_with("--") => {
        }
        Some(other) => {
            eprintln!("radar-mcp: unknown command `{other}`; use version|help, or no args to start the MCP server");
            std::process::exit(2);
        }
        None => {}
    }

    let service = RadarServer::new().serve(rmcp::transport::stdio()).await?;
    service.waiting().await?;
    Ok(())
}
