use handoff::Coroutine;

fn numbers(first: i64, last: i64) -> Coroutine<i64> {
    Coroutine::new(move |yielder| {
        println!("[inner] counting from {} to {}", first, last);
        for x in first..=last {
            yielder.suspend(x);
        }
        println!("[inner] done");
        last - first
    })
    .unwrap()
}

fn main() {
    let mut outer = Coroutine::new(|yielder| {
        let mut total = 0;
        for round in 0..3 {
            println!("[outer] delegating, round {}", round);
            let mut inner = numbers(5, 10);
            total += yielder.delegate(&mut inner);
            inner.close().unwrap();
        }
        println!("[outer] returning {}", total);
        total
    })
    .unwrap();

    let mut val = 0;
    while !outer.finished() {
        val = outer.resume(val);
        println!("[main] got {}", val);
    }

    assert_eq!(outer.return_value(), Some(&15));
    outer.close().unwrap();
}

#[test]
fn delegate() {
    main()
}
