use party_rooms_back::services::documentation::ApiDoc;
use utoipa::OpenApi;

/// Print the OpenAPI document so clients can be generated without a running server.
fn main() -> Result<(), serde_json::Error> {
    println!("{}", ApiDoc::openapi().to_pretty_json()?);
    Ok(())
}
