//! Allocates a growing run of blocks, frees all but one, and prints the
//! resulting state: the per-class page summary, then the leak report that
//! should show exactly the one block left outstanding.

fn main() {
    env_logger::init();
    slabcore::start().expect("start");

    let mut pointers = Vec::new();
    for i in 0..1024usize {
        let len = i + 1;
        let p = slabcore::allocate_dbg(len, file!(), line!() as i32, "main")
            .expect("allocation failed");
        pointers.push(p);
    }

    for p in pointers.drain(1..) {
        slabcore::free(p);
    }

    let _leak = slabcore::allocate_dbg(10, file!(), line!() as i32, "main").expect("leak");

    let stdout = std::io::stdout();
    let mut out = stdout.lock();
    slabcore::print_info(&mut out);
    slabcore::print_leak_info(&mut out);

    // deliberately not freed: `_leak` and the first block in `pointers`
    slabcore::stop().expect("stop");
}
