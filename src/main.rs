fn main() {
    pacer_lib::run()
}
