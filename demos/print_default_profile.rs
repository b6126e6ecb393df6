use keyvault::config;

pub fn main() {
    // Load the config, secrets are redacted by Debug
    let config = config::load_config(None).unwrap();
    println!("{:#?}", config);

    match (&config.client_id, &config.client_secret) {
        (Some(_), Some(_)) => println!("Client credentials are configured"),
        _ => eprintln!("client_id or client_secret not set, requests will fail to authenticate"),
    }
}
