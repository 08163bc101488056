use log::info;
use mongodb::bson::doc;
use mongodb::{options::ClientOptions, Client, Database};

pub struct MongoDB {
    pub client: Client,
    pub db: Database,
}

impl MongoDB {
    /// Connects and pings the server so a bad URI fails at start-up.
    pub async fn init(uri: &str, db_name: &str) -> Result<Self, mongodb::error::Error> {
        let client_options = ClientOptions::parse(uri).await?;
        let client = Client::with_options(client_options)?;
        let db = client.database(db_name);
        db.run_command(doc! { "ping": 1 }).await?;
        info!("Connected to MongoDB database '{}'", db_name);
        Ok(MongoDB { client, db })
    }
}
