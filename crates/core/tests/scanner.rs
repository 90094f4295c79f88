use std::fs;
use tempfile::tempdir;
use tzfix_core::scanner;

#[tokio::test]
async fn walks_media_and_skips_hidden_and_excluded() {
    let temp = tempdir().unwrap();
    let root = temp.path();
    fs::create_dir_all(root.join("DCIM/PANA_107")).unwrap();
    fs::create_dir_all(root.join(".thumbs")).unwrap();
    fs::create_dir_all(root.join("exports")).unwrap();

    fs::write(root.join("DCIM/PANA_107/P1070427.RW2"), b"raw").unwrap();
    fs::write(root.join("DCIM/PANA_107/P1070427.JPG"), b"jpg").unwrap();
    fs::write(root.join("DCIM/PANA_107/notes.txt"), b"txt").unwrap();
    fs::write(root.join(".thumbs/P1070427.jpg"), b"thumb").unwrap();
    fs::write(root.join("exports/P1070427.jpg"), b"export").unwrap();

    let mut found = scanner::scan(&[root.to_path_buf()], &["**/exports".to_string()])
        .await
        .unwrap();
    found.sort();

    let names: Vec<String> = found
        .iter()
        .map(|p| p.strip_prefix(root).unwrap().to_string_lossy().replace('\\', "/"))
        .collect();
    assert_eq!(
        names,
        vec!["DCIM/PANA_107/P1070427.JPG", "DCIM/PANA_107/P1070427.RW2"]
    );
}

#[tokio::test]
async fn explicit_files_are_kept() {
    let temp = tempdir().unwrap();
    let clip = temp.path().join("clip.MOV");
    let doc = temp.path().join("readme.md");
    fs::write(&clip, b"mov").unwrap();
    fs::write(&doc, b"doc").unwrap();

    let found = scanner::scan(&[clip.clone(), doc], &[]).await.unwrap();
    assert_eq!(found, vec![clip]);
}

#[tokio::test]
async fn missing_root_is_an_error() {
    let temp = tempdir().unwrap();
    let missing = temp.path().join("nope");
    assert!(scanner::scan(&[missing], &[]).await.is_err());
}
