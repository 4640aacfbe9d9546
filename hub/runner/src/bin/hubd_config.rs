use hubcore::config::HubConfig;

fn main() {
    let config = serdeconv::to_toml_string(&HubConfig::default())
        .expect("Failed to generate config file");

    println!("{}", config);
}
