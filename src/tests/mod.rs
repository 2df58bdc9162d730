mod e2e_test;
