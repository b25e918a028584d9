fn main() -> anyhow::Result<()> {
    linguaecho_lib::run()
}
