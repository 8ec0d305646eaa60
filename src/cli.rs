use clap::Parser;

#[derive(Parser, Debug, Clone)]
#[command(name = "snippet-runner", about = "Run code snippets and collect the files they create", version)]
pub struct Cli {
    /// Working directory for code execution and file operations.
    #[arg(long)]
    pub dir: Option<String>,

    /// Execution deadline in seconds (0 disables it).
    #[arg(long)]
    pub timeout: Option<u64>,

    /// Path under which the working directory is visible to the user.
    #[arg(long = "external-dir")]
    pub external_dir: Option<String>,
}

impl Cli {
    pub fn parse() -> Self {
        <Self as Parser>::parse()
    }
}
