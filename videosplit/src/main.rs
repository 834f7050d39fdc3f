macros::lib_main!(videosplit);
