use tutor_api::router::ApiDoc;
use utoipa::OpenApi;

/// Renders the OpenAPI document and writes it to a file.
fn write_document(
    api_doc: utoipa::openapi::OpenApi,
    path: &str,
) -> Result<(), Box<dyn std::error::Error>> {
    let document = api_doc.to_pretty_json()?;
    std::fs::write(path, document)?;
    Ok(())
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let path = std::env::args().nth(1).unwrap_or_else(|| "openapi.json".to_string());
    write_document(ApiDoc::openapi(), &path)?;
    println!("Wrote OpenAPI document to {path}");
    Ok(())
}
