mod checkin_flow_tests;
