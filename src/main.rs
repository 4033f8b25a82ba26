fn main() {
    story_soundtrack_lib::run()
}
