fn main() -> anyhow::Result<()> {
    production_dashboard_lib::run()
}
