fn main() {
    println!("cargo:rerun-if-changed=assets/channels.json");

    // Embed Windows manifest and icon when present
    #[cfg(target_os = "windows")]
    {
        let mut res = winres::WindowsResource::new();
        res.set("ProductName", "IPTV Deck");
        res.set("FileDescription", "IPTV Deck channel player");

        if std::path::Path::new("app.manifest").exists() {
            res.set_manifest_file("app.manifest");
        }
        if std::path::Path::new("assets/icon.ico").exists() {
            res.set_icon("assets/icon.ico");
        }

        if let Err(e) = res.compile() {
            println!("cargo:warning=Failed to embed manifest/icon: {}", e);
        }
    }
}
