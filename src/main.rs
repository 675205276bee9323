fn main() {
    schemaload_lib::run()
}
