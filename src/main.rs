#[actix_web::main]
async fn main() -> std::io::Result<()> {
    newsdesk_server::run().await
}
