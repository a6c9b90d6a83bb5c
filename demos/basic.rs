use handoff::Coroutine;

fn main() {
    println!("[main] creating coroutine");

    let mut coroutine = Coroutine::new(|yielder| {
        println!("[coroutine] coroutine started");
        let mut input = 0;
        for i in 0..5 {
            println!("[coroutine] yielding {}", i);
            input = yielder.suspend(i);
            println!("[coroutine] got {} from parent", input)
        }
        println!("[coroutine] exiting coroutine");
        input
    })
    .unwrap();

    let mut counter = 100;
    loop {
        println!("[main] resuming coroutine with argument {}", counter);
        let val = coroutine.resume(counter);
        if coroutine.finished() {
            println!("[main] coroutine returned {}", val);
            break;
        }
        println!("[main] got {:?} from coroutine", val);

        counter += 1;
    }

    coroutine.close().unwrap();
    println!("[main] exiting");
}

#[test]
fn basic() {
    main()
}
