use ipu_cli::{command, dispatch, exit_code_for};

#[tokio::main]
async fn main() {
    let matches = command().get_matches();

    let code = match dispatch(&matches).await {
        Ok(code) => code,
        Err(err) => {
            eprintln!("error: {err:#}");
            exit_code_for(&err)
        }
    };
    std::process::exit(code);
}
