fn main() -> anyhow::Result<()> {
    emubot::run()
}
