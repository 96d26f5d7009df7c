fn main() -> anyhow::Result<()> {
    sensedash_lib::run()
}
