#[rocket::launch]
fn rocket() -> _ {
    svego_api::rocket()
}
