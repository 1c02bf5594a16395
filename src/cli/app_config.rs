use clap::{ArgAction, Parser};

#[derive(Parser, Debug, Clone)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// The request url, like https://www.example.com
    pub url: String,
    /// Specify request method to use
    #[arg(short = 'X', long = "request", value_name = "method")]
    pub method_option: Option<String>,
    /// HTTP POST data.
    #[arg(short = 'd', long = "data", value_name = "data")]
    pub body_option: Option<String>,
    /// The http headers.
    #[arg(short = 'H', long = "header", value_name = "name: value")]
    pub headers: Vec<String>,
    /// Send User-Agent <name> to server
    #[arg(short = 'A', long = "user-agent", value_name = "name")]
    pub user_agent_option: Option<String>,
    /// The Cookie option.
    #[arg(short = 'b', long = "cookie", value_name = "data")]
    pub cookie_option: Option<String>,
    /// CA bundle (PEM) to verify the server with.
    #[arg(short = 'c', long = "cacert", value_name = "file")]
    pub certificate_path_option: Option<String>,
    /// Allow insecure server connections
    #[arg(short = 'k', long = "insecure")]
    pub skip_certificate_validate: bool,
    /// Write the body to file instead of discarding it.
    #[arg(short = 'o', long = "output", value_name = "file")]
    pub file_path_option: Option<String>,
    /// Follow redirects.
    #[arg(short = 'L', long = "location")]
    pub follow_redirects: bool,
    /// Send the request this many times over one client.
    #[arg(
        short = 'n',
        long = "repeat",
        value_name = "count",
        default_value_t = 1,
        value_parser = clap::value_parser!(u32).range(1..)
    )]
    pub repeat: u32,
    /// Print timings on a single line.
    #[arg(long, conflicts_with = "json")]
    pub compact: bool,
    /// Print the result as JSON.
    #[arg(long)]
    pub json: bool,
    /// Maximum time allowed for one request, in seconds.
    #[arg(short = 'm', long = "max-time", value_name = "seconds", default_value_t = 30)]
    pub max_time: u64,
    /// Maximum time allowed for each connect attempt, in seconds.
    #[arg(long = "connect-timeout", value_name = "seconds")]
    pub connect_timeout: Option<u64>,
    /// Make the operation more talkative
    #[arg(short = 'v', long = "verbose", action = ArgAction::Count)]
    pub verbosity: u8,
}
