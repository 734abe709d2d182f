pub fn setup() {
    // Colored backtraces. Only enabled when debugging, release builds keep the default hook.
    #[cfg(debug_assertions)]
    {
        color_backtrace::install();
    }
}
