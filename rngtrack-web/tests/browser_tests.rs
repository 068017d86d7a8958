#![cfg(target_arch = "wasm32")]
use rngtrack_core::{CONTRIBUTOR_KEY, ContributorId, IdentityStore, load_or_create};
use rngtrack_web::{LocalStorageIdentity, dom};
use wasm_bindgen_test::*;

wasm_bindgen_test::wasm_bindgen_test_configure!(run_in_browser);

#[wasm_bindgen_test]
fn contributor_id_survives_reload() {
    let storage = dom::local_storage().expect("localStorage");
    let _ = storage.remove_item(CONTRIBUTOR_KEY);

    let created = load_or_create(&LocalStorageIdentity).expect("identity");
    assert_eq!(
        storage.get_item(CONTRIBUTOR_KEY).expect("read"),
        Some(created.to_string())
    );
    assert_eq!(load_or_create(&LocalStorageIdentity).expect("identity"), created);
}

#[wasm_bindgen_test]
fn adopted_identity_overwrites_the_stored_one() {
    let adopted = ContributorId::parse("imported-device").expect("id");
    LocalStorageIdentity.save(&adopted).expect("save");
    assert_eq!(LocalStorageIdentity.load().expect("load"), Some(adopted));
}
